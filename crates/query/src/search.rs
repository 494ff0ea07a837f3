//! Full-text search (§4.F "Full-text search").

use serde::Serialize;
use traffic_mcp_store::{HttpTransaction, WebSocketConnection};

use crate::{QueryError, QueryFacade, QueryResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchField {
    Url,
    Headers,
    Body,
    Response,
}

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: String,
    pub fields: Vec<SearchField>,
    pub case_sensitive: bool,
    pub regex: bool,
}

/// Results of a search, kept split by table rather than merged into
/// [`crate::TrafficRecord`] — FTS ranks each source independently and §4.F
/// caps each at 1000 rather than a combined total.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResults {
    pub http: Vec<HttpTransaction>,
    pub websocket: Vec<WebSocketConnection>,
}

fn http_columns(fields: &[SearchField]) -> Vec<&'static str> {
    let mut cols = Vec::new();
    for field in fields {
        match field {
            SearchField::Url => cols.push("url"),
            SearchField::Headers => cols.push("request_headers"),
            SearchField::Body => cols.push("request_body"),
            SearchField::Response => {
                cols.push("response_body");
                cols.push("response_headers");
            }
        }
    }
    if cols.is_empty() {
        cols.push("url");
    }
    cols
}

fn ws_columns(fields: &[SearchField]) -> Vec<&'static str> {
    let mut cols = Vec::new();
    for field in fields {
        match field {
            SearchField::Url => cols.push("url"),
            SearchField::Headers => cols.push("request_headers"),
            // WS connection rows carry no body; messages aren't searched here.
            SearchField::Body | SearchField::Response => {}
        }
    }
    if cols.is_empty() {
        cols.push("url");
    }
    cols
}

/// Build the FTS5 MATCH expression for a raw query string (§4.F): if it
/// contains any of `.:-@/`, wrap the whole thing in double quotes so FTS5's
/// tokenizer treats it as one phrase rather than tripping over operator
/// characters; otherwise escape `'`, `"`, and `*`, FTS5's own special
/// characters.
fn build_match_expr(text: &str, columns: &[&str]) -> String {
    let needs_quoting = text.contains(['.', ':', '-', '@', '/']);
    let escaped = if needs_quoting {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.replace('\'', "''").replace('"', "\"\"").replace('*', "")
    };
    let column_scope = format!("{{{}}}", columns.join(" "));
    format!("{column_scope} : {escaped}")
}

impl QueryFacade {
    /// Run a full-text search across the requested fields (§4.F).
    ///
    /// Tries the FTS5 MATCH first; on zero rows or an FTS error, falls back
    /// to LIKE over the raw columns (or REGEXP, if `regex` is set — §4.F
    /// "Regex search is implemented only in the LIKE path").
    pub fn search(&self, query: &SearchQuery) -> QueryResult<SearchResults> {
        if query.text.trim().is_empty() {
            return Err(QueryError::InvalidArgument("search text must not be empty".into()));
        }

        let http_cols = http_columns(&query.fields);
        let ws_cols = ws_columns(&query.fields);

        let http = if query.regex {
            self.store.search_http_like(&query.text, &http_cols, true)?
        } else {
            let expr = build_match_expr(&query.text, &http_cols);
            match self.store.search_http_fts(&expr) {
                Ok(rows) if !rows.is_empty() => rows,
                Ok(_) => self.like_http(query, &http_cols)?,
                Err(err) => {
                    tracing::warn!(error = %err, "http FTS search failed, falling back to LIKE");
                    self.like_http(query, &http_cols)?
                }
            }
        };

        let websocket = if query.regex {
            self.store.search_ws_like(&query.text, &ws_cols, true)?
        } else {
            let expr = build_match_expr(&query.text, &ws_cols);
            match self.store.search_ws_fts(&expr) {
                Ok(rows) if !rows.is_empty() => rows,
                Ok(_) => self.like_ws(query, &ws_cols)?,
                Err(err) => {
                    tracing::warn!(error = %err, "websocket FTS search failed, falling back to LIKE");
                    self.like_ws(query, &ws_cols)?
                }
            }
        };

        Ok(SearchResults { http, websocket })
    }

    fn like_http(&self, query: &SearchQuery, columns: &[&str]) -> QueryResult<Vec<HttpTransaction>> {
        let pattern = if query.case_sensitive {
            query.text.clone()
        } else {
            query.text.to_lowercase()
        };
        Ok(self.store.search_http_like(&pattern, columns, false)?)
    }

    fn like_ws(&self, query: &SearchQuery, columns: &[&str]) -> QueryResult<Vec<WebSocketConnection>> {
        let pattern = if query.case_sensitive {
            query.text.clone()
        } else {
            query.text.to_lowercase()
        };
        Ok(self.store.search_ws_like(&pattern, columns, false)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_query_is_quoted() {
        let expr = build_match_expr("api.example.com", &["url"]);
        assert!(expr.contains("\"api.example.com\""));
    }

    #[test]
    fn plain_query_escapes_special_chars() {
        let expr = build_match_expr("O'Brien*", &["url"]);
        assert!(!expr.contains('*'));
        assert!(expr.contains("''"));
    }

    #[test]
    fn empty_query_rejected() {
        use traffic_mcp_store::Store;
        let facade = QueryFacade::new(Store::open_in_memory().unwrap());
        let err = facade
            .search(&SearchQuery {
                text: "   ".into(),
                fields: vec![SearchField::Url],
                case_sensitive: false,
                regex: false,
            })
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidArgument(_)));
    }
}
