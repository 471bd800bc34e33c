use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::CalendarError;
use crate::limits::{MAX_QUERY_PRODUCTS, MAX_SKILL_LEN};
use crate::model::Criteria;

/// The booking front-end's request, as received. Missing fields decode as
/// empty so validation can name them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryRequest {
    pub date: String,
    pub products: Vec<String>,
    pub language: String,
    pub rating: String,
}

/// A validated request. Built once per request, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub date: NaiveDate,
    pub criteria: Criteria,
}

impl Query {
    pub fn parse(request: QueryRequest) -> Result<Self, CalendarError> {
        let QueryRequest { date, products, language, rating } = request;

        if date.is_empty() {
            return Err(CalendarError::validation("date", "date is empty"));
        }
        if language.is_empty() {
            return Err(CalendarError::validation("language", "language is empty"));
        }
        if products.is_empty() {
            return Err(CalendarError::validation("products", "products is empty"));
        }
        if products.iter().any(String::is_empty) {
            return Err(CalendarError::validation("products", "product name is empty"));
        }
        if rating.is_empty() {
            return Err(CalendarError::validation("rating", "rating is empty"));
        }
        if products.len() > MAX_QUERY_PRODUCTS {
            return Err(CalendarError::validation("products", "too many products"));
        }
        let too_long = [&language, &rating]
            .into_iter()
            .chain(products.iter())
            .find(|s| s.len() > MAX_SKILL_LEN);
        if let Some(value) = too_long {
            return Err(CalendarError::validation(
                "payload",
                format!("value longer than {MAX_SKILL_LEN} bytes: {value:.16}…"),
            ));
        }

        let date = parse_date(&date)?;
        Ok(Self {
            date,
            criteria: Criteria {
                products: products.into_iter().collect::<BTreeSet<_>>(),
                language,
                rating,
            },
        })
    }
}

/// Strict `YYYY-MM-DD`.
pub fn parse_date(raw: &str) -> Result<NaiveDate, CalendarError> {
    let bytes = raw.as_bytes();
    let shaped = bytes.len() == 10 && bytes[4] == b'-' && bytes[7] == b'-';
    if !shaped {
        return Err(CalendarError::InvalidDate(raw.to_string()));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| CalendarError::InvalidDate(raw.to_string()))
}
