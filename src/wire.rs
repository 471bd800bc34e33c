use std::fmt::Debug;
use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::noop::NoopStartupHandler;
use pgwire::api::auth::StartupHandler;
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use tokio::net::TcpStream;

use crate::engine::{Engine, EngineError};
use crate::error::CalendarError;
use crate::model::*;
use crate::observability::{SQL_COMMANDS_TOTAL, command_label};
use crate::service::CalendarService;
use crate::sql::{self, Command, SqlError};

pub struct CalendarHandler {
    engine: Arc<Engine>,
    service: Arc<CalendarService>,
    query_parser: Arc<CalendarQueryParser>,
}

impl CalendarHandler {
    pub fn new(engine: Arc<Engine>, service: Arc<CalendarService>) -> Self {
        Self {
            engine,
            service,
            query_parser: Arc::new(CalendarQueryParser),
        }
    }

    async fn execute(&self, cmd: Command, format: &Format) -> PgWireResult<Response> {
        let label = command_label(&cmd);
        let result = self.execute_command(cmd, format).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(SQL_COMMANDS_TOTAL, "command" => label, "status" => status).increment(1);
        result
    }

    async fn execute_command(&self, cmd: Command, format: &Format) -> PgWireResult<Response> {
        let engine = &self.engine;
        match cmd {
            Command::InsertManager { id, name, profile } => {
                engine.create_manager(id, name, profile).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::DeleteManager { id } => {
                engine.delete_manager(id).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::InsertSlots { mut slots } => {
                let count = slots.len();
                if count == 1 {
                    let (id, manager_id, start, end, booked) = slots.remove(0);
                    engine
                        .add_slot(id, manager_id, start, end, booked)
                        .await
                        .map_err(engine_err)?;
                } else {
                    engine.batch_add_slots(slots).await.map_err(engine_err)?;
                }
                Ok(Response::Execution(Tag::new("INSERT").with_rows(count)))
            }
            Command::SetSlotBooked { id, booked } => {
                engine.set_slot_booked(id, booked).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::DeleteSlot { id } => {
                engine.remove_slot(id).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectManagers => {
                let managers = engine.list_managers().await;
                let schema = Arc::new(manager_schema(format));
                let rows: Vec<PgWireResult<_>> = managers
                    .into_iter()
                    .map(|m| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&m.id)?;
                        encoder.encode_field(&m.name)?;
                        encoder.encode_field(&array_literal(&m.profile.languages))?;
                        encoder.encode_field(&array_literal(&m.profile.products))?;
                        encoder.encode_field(&array_literal(&m.profile.customer_ratings))?;
                        encoder.encode_field(&(m.slot_count as i64))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::SelectSlots { manager_id } => {
                let slots = engine.list_slots(manager_id).await.map_err(engine_err)?;
                let schema = Arc::new(slot_schema(format));
                let rows: Vec<PgWireResult<_>> = slots
                    .into_iter()
                    .map(|s| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&s.id)?;
                        encoder.encode_field(&s.manager_id)?;
                        encoder.encode_field(&render_ms(s.start))?;
                        encoder.encode_field(&render_ms(s.end))?;
                        encoder.encode_field(&s.booked)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::SelectAvailableSlots { request } => {
                let slots = self
                    .service
                    .available_slots(request)
                    .await
                    .map_err(calendar_err)?;
                let schema = Arc::new(available_slot_schema(format));
                let rows: Vec<PgWireResult<_>> = slots
                    .into_iter()
                    .map(|slot| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&slot.start_timestamp)?;
                        encoder.encode_field(&(slot.available_count as i64))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
        }
    }
}

/// Columns in the client's requested result format.
fn fields(columns: &[(&str, Type)], format: &Format) -> Vec<FieldInfo> {
    columns
        .iter()
        .enumerate()
        .map(|(i, (name, ty))| {
            FieldInfo::new(name.to_string(), None, None, ty.clone(), format.format_for(i))
        })
        .collect()
}

fn manager_schema(format: &Format) -> Vec<FieldInfo> {
    fields(
        &[
            ("id", Type::INT8),
            ("name", Type::VARCHAR),
            ("languages", Type::VARCHAR),
            ("products", Type::VARCHAR),
            ("customer_ratings", Type::VARCHAR),
            ("slot_count", Type::INT8),
        ],
        format,
    )
}

fn slot_schema(format: &Format) -> Vec<FieldInfo> {
    fields(
        &[
            ("id", Type::INT8),
            ("sales_manager_id", Type::INT8),
            ("start_date", Type::VARCHAR),
            ("end_date", Type::VARCHAR),
            ("booked", Type::BOOL),
        ],
        format,
    )
}

fn available_slot_schema(format: &Format) -> Vec<FieldInfo> {
    fields(
        &[("start_date", Type::VARCHAR), ("available_count", Type::INT8)],
        format,
    )
}

/// Result columns for a statement, judged from its text alone. Statements
/// with unbound placeholders cannot be parsed yet.
fn result_schema(sql: &str, format: &Format) -> Vec<FieldInfo> {
    let upper = sql.trim_start().to_uppercase();
    if !upper.starts_with("SELECT") {
        return vec![];
    }
    if upper.contains("AVAILABLE_SLOTS") {
        available_slot_schema(format)
    } else if upper.contains("SALES_MANAGERS") {
        manager_schema(format)
    } else if upper.contains("SLOTS") {
        slot_schema(format)
    } else {
        vec![]
    }
}

/// `{a,b}`: the Postgres text form of a text array.
fn array_literal<'a>(items: impl IntoIterator<Item = &'a String>) -> String {
    let joined: Vec<&str> = items.into_iter().map(String::as_str).collect();
    format!("{{{}}}", joined.join(","))
}

fn render_ms(ms: Ms) -> String {
    to_utc(ms)
        .map(|ts| format_timestamp(&ts))
        .unwrap_or_else(|| ms.to_string())
}

#[async_trait]
impl SimpleQueryHandler for CalendarHandler {
    async fn do_query<C>(
        &self,
        _client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let cmds = sql::parse_batch(query).map_err(sql_err)?;
        let mut responses = Vec::with_capacity(cmds.len());
        for cmd in cmds {
            responses.push(self.execute(cmd, &Format::UnifiedText).await?);
        }
        Ok(responses)
    }
}

impl NoopStartupHandler for CalendarHandler {}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct CalendarQueryParser;

#[async_trait]
impl QueryParser for CalendarQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt, column_format.unwrap_or(&Format::UnifiedText)))
    }
}

#[async_trait]
impl ExtendedQueryHandler for CalendarHandler {
    type Statement = String;
    type QueryParser = CalendarQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        _client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        self.execute(cmd, &portal.result_column_format).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement, &Format::UnifiedText),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
            &target.result_column_format,
        )))
    }
}

/// `$N` placeholders outside quoted text and `--` comments, as byte range and index.
fn placeholders(sql: &str) -> Vec<(Range<usize>, usize)> {
    let bytes = sql.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"') => {
                // A doubled quote closes and reopens, which skips the same text.
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
                i += 1;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'$' => {
                let start = i;
                i += 1;
                let digits = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                match sql[digits..i].parse::<usize>() {
                    Ok(n) if n > 0 => found.push((start..i, n)),
                    _ => {}
                }
            }
            _ => i += 1,
        }
    }
    found
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    placeholders(sql).into_iter().map(|(_, n)| n).max().unwrap_or(0)
}

/// Replace each placeholder of `sql` with its bound value (text format) in one
/// pass, so bound values are never scanned for placeholders themselves.
fn bind_params<B: AsRef<[u8]>>(sql: &str, params: &[Option<B>]) -> String {
    let mut result = String::with_capacity(sql.len());
    let mut copied = 0;
    for (range, n) in placeholders(sql) {
        let Some(param) = params.get(n - 1) else {
            continue;
        };
        result.push_str(&sql[copied..range.start]);
        match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes.as_ref());
                result.push('\'');
                result.push_str(&text.replace('\'', "''"));
                result.push('\'');
            }
            None => result.push_str("NULL"),
        }
        copied = range.end;
    }
    result.push_str(&sql[copied..]);
    result
}

fn substitute_params(portal: &Portal<String>) -> String {
    bind_params(&portal.statement.statement, &portal.parameters)
}

// ── Factory ──────────────────────────────────────────────────────

#[derive(Clone)]
pub struct CalendarFactory {
    handler: Arc<CalendarHandler>,
    noop: Arc<NoopHandler>,
}

impl CalendarFactory {
    pub fn new(engine: Arc<Engine>, service: Arc<CalendarService>) -> Self {
        Self {
            handler: Arc::new(CalendarHandler::new(engine, service)),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for CalendarFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
    service: Arc<CalendarService>,
) -> std::io::Result<()> {
    let factory = CalendarFactory::new(engine, service);
    pgwire::tokio::process_socket(socket, None, factory).await
}

// ── Error mapping ────────────────────────────────────────────────

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        message,
    )))
}

fn engine_err(e: EngineError) -> PgWireError {
    let code = match &e {
        EngineError::ManagerExists(_) | EngineError::SlotExists(_) => "23505",
        _ => "P0001",
    };
    user_error(code, e.to_string())
}

fn sql_err(e: SqlError) -> PgWireError {
    user_error("42601", e.to_string())
}

fn calendar_sqlstate(e: &CalendarError) -> &'static str {
    match e {
        CalendarError::Validation { .. } => "22023",
        CalendarError::InvalidDate(_) => "22007",
        CalendarError::Storage(_) => "58000",
    }
}

fn calendar_err(e: CalendarError) -> PgWireError {
    user_error(calendar_sqlstate(&e), e.public_message())
}
