use std::collections::BTreeSet;

use chrono::DateTime;
use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor,
    TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::engine::NewSlot;
use crate::model::*;
use crate::query::QueryRequest;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertManager {
        id: ManagerId,
        name: Option<String>,
        profile: SkillProfile,
    },
    DeleteManager {
        id: ManagerId,
    },
    InsertSlots {
        slots: Vec<NewSlot>,
    },
    SetSlotBooked {
        id: SlotId,
        booked: bool,
    },
    DeleteSlot {
        id: SlotId,
    },
    SelectManagers,
    SelectSlots {
        manager_id: ManagerId,
    },
    /// Filters are passed through unvalidated; absent ones stay empty.
    SelectAvailableSlots {
        request: QueryRequest,
    },
}

const MANAGER_COLUMNS: [&str; 5] = ["id", "name", "languages", "products", "customer_ratings"];
const SLOT_COLUMNS: [&str; 5] = ["id", "sales_manager_id", "start_date", "end_date", "booked"];

fn parse_statements(sql: &str) -> Result<Vec<Statement>, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }
    Ok(stmts)
}

/// First statement only. The extended protocol carries one statement per Parse.
pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let stmts = parse_statements(sql)?;
    to_command(&stmts[0])
}

/// Every `;`-separated statement, in order. Nothing is returned if any fails to parse.
pub fn parse_batch(sql: &str) -> Result<Vec<Command>, SqlError> {
    parse_statements(sql)?.iter().map(to_command).collect()
}

fn to_command(stmt: &Statement) -> Result<Command, SqlError> {
    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Update { table, assignments, selection, .. } => {
            parse_update(table, assignments, selection)
        }
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

/// One VALUES row keyed by column name. Without a column list the table's
/// columns are assumed in declaration order.
struct Row<'a> {
    columns: Vec<String>,
    values: &'a [Expr],
}

impl<'a> Row<'a> {
    fn get(&self, column: &str) -> Option<&'a Expr> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    fn require(&self, column: &'static str) -> Result<&'a Expr, SqlError> {
        self.get(column).ok_or(SqlError::MissingColumn(column))
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let rows = extract_all_insert_rows(insert)?;
    let declared: &[&str] = match table.as_str() {
        "sales_managers" => &MANAGER_COLUMNS,
        "slots" => &SLOT_COLUMNS,
        _ => return Err(SqlError::UnknownTable(table)),
    };
    let columns: Vec<String> = if insert.columns.is_empty() {
        declared.iter().map(|c| c.to_string()).collect()
    } else {
        insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
    };
    if let Some(unknown) = columns.iter().find(|c| !declared.contains(&c.as_str())) {
        return Err(SqlError::UnknownColumn(unknown.clone()));
    }
    for row in &rows {
        if row.len() != columns.len() {
            return Err(SqlError::WrongArity(columns.len(), row.len()));
        }
    }

    match table.as_str() {
        "sales_managers" => {
            if rows.len() != 1 {
                return Err(SqlError::Unsupported("multi-row INSERT into sales_managers".into()));
            }
            let row = Row { columns, values: &rows[0] };
            let name = match row.get("name") {
                Some(expr) => parse_string_or_null(expr)?,
                None => None,
            };
            let set_or_empty = |column| match row.get(column) {
                Some(expr) => parse_string_set(expr),
                None => Ok(BTreeSet::new()),
            };
            Ok(Command::InsertManager {
                id: parse_i64(row.require("id")?)?,
                name,
                profile: SkillProfile {
                    languages: set_or_empty("languages")?,
                    products: set_or_empty("products")?,
                    customer_ratings: set_or_empty("customer_ratings")?,
                },
            })
        }
        _ => {
            let mut slots = Vec::with_capacity(rows.len());
            for (i, values) in rows.iter().enumerate() {
                let row = Row { columns: columns.clone(), values };
                slots.push(parse_slot_row(&row).map_err(|e| SqlError::Parse(format!("row {i}: {e}")))?);
            }
            Ok(Command::InsertSlots { slots })
        }
    }
}

fn parse_slot_row(row: &Row<'_>) -> Result<NewSlot, SqlError> {
    let booked = match row.get("booked") {
        Some(expr) => parse_bool(expr)?,
        None => false,
    };
    Ok((
        parse_i64(row.require("id")?)?,
        parse_i64(row.require("sales_manager_id")?)?,
        parse_timestamp(row.require("start_date")?)?,
        parse_timestamp(row.require("end_date")?)?,
        booked,
    ))
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_eq(&delete.selection, "id")?;

    match table.as_str() {
        "sales_managers" => Ok(Command::DeleteManager { id }),
        "slots" => Ok(Command::DeleteSlot { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let name = table_factor_name(&table.relation)?;
    if name != "slots" {
        return Err(SqlError::Unsupported(format!("UPDATE {name}")));
    }
    let [assignment] = assignments else {
        return Err(SqlError::Unsupported("UPDATE slots must set exactly booked".into()));
    };
    let column = match &assignment.target {
        AssignmentTarget::ColumnName(name) => object_name_last(name),
        _ => None,
    };
    if column.as_deref() != Some("booked") {
        return Err(SqlError::Unsupported("UPDATE slots must set exactly booked".into()));
    }
    Ok(Command::SetSlotBooked {
        id: extract_where_eq(selection, "id")?,
        booked: parse_bool(&assignment.value)?,
    })
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    match table.as_str() {
        "sales_managers" => Ok(Command::SelectManagers),
        "slots" => Ok(Command::SelectSlots {
            manager_id: extract_where_eq(&select.selection, "sales_manager_id")?,
        }),
        "available_slots" => {
            let mut request = QueryRequest::default();
            if let Some(selection) = &select.selection {
                extract_query_filters(selection, &mut request)?;
            }
            Ok(Command::SelectAvailableSlots { request })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn extract_query_filters(expr: &Expr, request: &mut QueryRequest) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => extract_query_filters(inner, request),
        Expr::BinaryOp { left, op, right } => {
            let col = expr_column_name(left);
            match (op, col.as_deref()) {
                (ast::BinaryOperator::And, _) => {
                    extract_query_filters(left, request)?;
                    extract_query_filters(right, request)
                }
                (ast::BinaryOperator::Eq, Some("date")) => {
                    request.date = parse_string(right)?;
                    Ok(())
                }
                (ast::BinaryOperator::Eq, Some("language")) => {
                    request.language = parse_string(right)?;
                    Ok(())
                }
                (ast::BinaryOperator::Eq, Some("rating")) => {
                    request.rating = parse_string(right)?;
                    Ok(())
                }
                (ast::BinaryOperator::AtArrow, Some("products")) => {
                    request.products = parse_string_list(right)?;
                    Ok(())
                }
                _ => Err(SqlError::Unsupported(format!("filter {expr}"))),
            }
        }
        _ => Err(SqlError::Unsupported(format!("filter {expr}"))),
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_all_insert_rows(insert: &ast::Insert) -> Result<Vec<Vec<Expr>>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows.clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_eq(selection: &Option<Expr>, column: &'static str) -> Result<i64, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter(column))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } if expr_column_name(left).as_deref() == Some(column) => parse_i64(right),
        _ => Err(SqlError::MissingFilter(column)),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
}

/// Unix milliseconds, or an RFC 3339 string.
fn parse_timestamp(expr: &Expr) -> Result<Ms, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) if s.parse::<i64>().is_err() => {
            DateTime::parse_from_rfc3339(s)
                .map(|ts| ts.timestamp_millis())
                .map_err(|e| SqlError::Parse(format!("bad timestamp {s:?}: {e}")))
        }
        _ => parse_i64(expr),
    }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        _ => Err(SqlError::Parse(format!("expected string, got {expr}"))),
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => parse_string(expr).map(Some),
    }
}

/// `ARRAY['a', 'b']` or a `'{a,b}'` array literal.
fn parse_string_list(expr: &Expr) -> Result<Vec<String>, SqlError> {
    match expr {
        Expr::Array(ast::Array { elem, .. }) => elem.iter().map(parse_string).collect(),
        Expr::Nested(inner) => parse_string_list(inner),
        _ => match extract_value(expr) {
            Some(Value::SingleQuotedString(s)) => parse_array_literal(s),
            _ => Err(SqlError::Parse(format!("expected array, got {expr}"))),
        },
    }
}

fn parse_string_set(expr: &Expr) -> Result<BTreeSet<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(BTreeSet::new()),
        _ => Ok(parse_string_list(expr)?.into_iter().collect()),
    }
}

fn parse_array_literal(s: &str) -> Result<Vec<String>, SqlError> {
    let inner = s
        .trim()
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .ok_or_else(|| SqlError::Parse(format!("bad array literal {s:?}")))?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(inner
        .split(',')
        .map(|item| item.trim().trim_matches('"').to_string())
        .collect())
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Boolean(b) => Ok(*b),
            Value::SingleQuotedString(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
            },
            Value::Number(n, _) => Ok(n != "0"),
            _ => Err(SqlError::Parse(format!("expected bool, got {value}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String),
    MissingColumn(&'static str),
    WrongArity(usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(c) => write!(f, "unknown column: {c}"),
            SqlError::MissingColumn(c) => write!(f, "missing column: {c}"),
            SqlError::WrongArity(expected, got) => {
                write!(f, "expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
