//! `flights_finder` -- flight discovery over free-text web search.
//!
//! Builds a natural-language query from the typed parameters, runs it
//! through the configured [`SearchBackend`], and scans the result text
//! line by line for airline names, prices, durations, stops, and
//! departure times. Extraction is best-effort: when nothing structured
//! parses, keyword-bearing text segments are returned instead, and an
//! empty search yields a single marker record rather than an empty
//! list so the model always has something to work with.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::search::SearchBackend;
use wayfarer_agent::{AgentError, ToolDefinition, ToolHandler};

/// At most this many flight records are returned.
const MAX_RESULTS: usize = 5;

static AIRLINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"([\w\s]+Airlines|[\w\s]+Airways|Delta|United|American|Southwest|JetBlue|Alaska|Spirit)",
    )
    .expect("airline regex")
});

static PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\d+(?:,\d+)?(?:\.\d+)?").expect("price regex"));

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+h\s*\d+m|\d+\s*hours?\s*(?:\d+\s*minutes?)?").expect("duration regex")
});

static CLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,2}:\d{2}\s*[APap][Mm]").expect("clock regex"));

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

/// Typed view of the tool call arguments.
#[derive(Debug, Deserialize)]
struct FlightsQuery {
    departure_airport: String,
    arrival_airport: String,
    outbound_date: String,
    return_date: Option<String>,
    #[serde(default = "default_adults")]
    adults: u32,
    #[serde(default)]
    children: u32,
    #[serde(default)]
    infants_in_seat: u32,
    #[serde(default)]
    infants_on_lap: u32,
}

fn default_adults() -> u32 {
    1
}

/// Reformat `YYYY-MM-DD` as a spelled-out date ("June 22, 2024"),
/// falling back to the raw string when the input is not ISO-shaped.
fn human_date(raw: &str) -> String {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| d.format("%B %d, %Y").to_string())
        .unwrap_or_else(|_| raw.to_owned())
}

impl FlightsQuery {
    /// Render the search query the way a person would type it.
    fn to_search_query(&self) -> String {
        let mut query = format!(
            "flights from {} to {} on {} ",
            self.departure_airport,
            self.arrival_airport,
            human_date(&self.outbound_date)
        );

        if let Some(ref return_date) = self.return_date {
            query.push_str(&format!("return {} ", human_date(return_date)));
        }

        let mut passengers = Vec::new();
        if self.adults > 0 {
            passengers.push(plural(self.adults, "adult", "adults"));
        }
        if self.children > 0 {
            passengers.push(plural(self.children, "child", "children"));
        }
        if self.infants_in_seat > 0 {
            passengers.push(format!(
                "{} with seat",
                plural(self.infants_in_seat, "infant", "infants")
            ));
        }
        if self.infants_on_lap > 0 {
            passengers.push(format!(
                "{} on lap",
                plural(self.infants_on_lap, "infant", "infants")
            ));
        }
        if !passengers.is_empty() {
            query.push_str(&format!("for {} ", passengers.join(", ")));
        }

        query.push_str("best flights with prices");
        query
    }
}

fn plural(n: u32, singular: &str, plural: &str) -> String {
    if n == 1 {
        format!("{n} {singular}")
    } else {
        format!("{n} {plural}")
    }
}

// ---------------------------------------------------------------------------
// Result extraction
// ---------------------------------------------------------------------------

/// Scan free search text for flight-shaped records.
///
/// Records accumulate field by field across consecutive lines and are
/// flushed on blank lines once they carry at least two fields. The
/// keyword-segment fallback kicks in when no record forms at all.
fn parse_flight_results(text: &str) -> Vec<Value> {
    let mut flights: Vec<Value> = Vec::new();
    let mut current = Map::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if current.len() >= 2 {
                flights.push(Value::Object(std::mem::take(&mut current)));
            } else {
                current.clear();
            }
            continue;
        }

        if !current.contains_key("airline")
            && let Some(m) = AIRLINE_RE.find(line)
        {
            current.insert("airline".into(), json!(m.as_str().trim()));
        }
        if !current.contains_key("price")
            && let Some(m) = PRICE_RE.find(line)
        {
            current.insert("price".into(), json!(m.as_str()));
        }
        if !current.contains_key("duration")
            && let Some(m) = DURATION_RE.find(line)
        {
            current.insert("duration".into(), json!(m.as_str().trim()));
        }

        let lower = line.to_lowercase();
        if !current.contains_key("stops") {
            if lower.contains("nonstop") {
                current.insert("stops".into(), json!("Nonstop"));
            } else if lower.contains("1 stop") {
                current.insert("stops".into(), json!("1 stop"));
            } else if lower.contains("2 stop") {
                current.insert("stops".into(), json!("2 stops"));
            }
        }

        if !current.contains_key("times") && CLOCK_RE.is_match(line) {
            current.insert("times".into(), json!(line.trim()));
        }
    }
    if current.len() >= 2 {
        flights.push(Value::Object(current));
    }

    // Nothing structured: fall back to keyword-bearing text segments.
    if flights.is_empty() {
        for segment in text.split(". ").take(MAX_RESULTS) {
            let lower = segment.to_lowercase();
            let relevant = ["flight", "airline", "airport", "$", "ticket"]
                .iter()
                .any(|k| lower.contains(k));
            if relevant {
                flights.push(json!({
                    "information": segment.trim(),
                    "note": "extracted text segment that may contain flight information",
                }));
            }
        }
    }

    flights.truncate(MAX_RESULTS);
    flights
}

// ---------------------------------------------------------------------------
// Tool handler
// ---------------------------------------------------------------------------

/// Tool handler for flight search.
pub struct FlightsFinder {
    backend: Arc<dyn SearchBackend>,
}

impl FlightsFinder {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ToolHandler for FlightsFinder {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "flights_finder".into(),
            description: "Find flights between two airports on given dates. \
                          Returns up to 5 results with airline, price, duration, \
                          and stops when available."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "departure_airport": {
                        "type": "string",
                        "description": "Departure airport code (e.g., LAX)"
                    },
                    "arrival_airport": {
                        "type": "string",
                        "description": "Arrival airport code (e.g., JFK)"
                    },
                    "outbound_date": {
                        "type": "string",
                        "description": "Outbound date in YYYY-MM-DD format"
                    },
                    "return_date": {
                        "type": "string",
                        "description": "Return date in YYYY-MM-DD format for round trips"
                    },
                    "adults": {
                        "type": "integer",
                        "description": "Number of adult passengers (default: 1)"
                    },
                    "children": {
                        "type": "integer",
                        "description": "Number of children passengers"
                    },
                    "infants_in_seat": {
                        "type": "integer",
                        "description": "Number of infants requiring a seat"
                    },
                    "infants_on_lap": {
                        "type": "integer",
                        "description": "Number of infants on lap"
                    }
                },
                "required": ["departure_airport", "arrival_airport", "outbound_date"]
            }),
        }
    }

    async fn invoke(&self, arguments: Value) -> wayfarer_agent::Result<Value> {
        let query: FlightsQuery =
            serde_json::from_value(arguments).map_err(AgentError::Json)?;
        let search_query = query.to_search_query();
        debug!(%search_query, "flights search");

        let text = self
            .backend
            .search(&search_query)
            .await
            .map_err(|e| e.for_tool("flights_finder"))?;

        let flights = parse_flight_results(&text);
        if flights.is_empty() {
            return Ok(json!([{
                "message": "No flight results could be extracted from the search. \
                            Try adjusting your search parameters."
            }]));
        }
        Ok(Value::Array(flights))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
