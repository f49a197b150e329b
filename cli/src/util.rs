use beacon_core::analytics::Timeframe;
use beacon_core::lexicon::{Language, TimeOfDay};
use serde_json::json;

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

fn print_json(value: &serde_json::Value, to_stderr: bool) {
    let formatted = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    if to_stderr {
        eprintln!("{formatted}");
    } else {
        println!("{formatted}");
    }
}

pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    let mut err = json!({
        "error": "cli_error",
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    print_json(&err, true);
    std::process::exit(4);
}

/// Exit codes: 0=success (2xx), 1=client error (4xx), 2=server error (5xx),
///             3=connection error, 4=usage error
pub fn exit_code_for(status: u16) -> i32 {
    match status {
        200..=299 => 0,
        400..=499 => 1,
        _ => 2,
    }
}

/// A request against the Beacon API, scoped to one user when `user_id` is set.
pub struct ApiCall<'a> {
    pub method: reqwest::Method,
    pub path: &'a str,
    pub user_id: Option<&'a str>,
    pub body: Option<serde_json::Value>,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(&'static str, String)>,
}

impl<'a> ApiCall<'a> {
    pub fn get(path: &'a str) -> Self {
        Self {
            method: reqwest::Method::GET,
            path,
            user_id: None,
            body: None,
            query: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn post(path: &'a str, body: serde_json::Value) -> Self {
        Self {
            method: reqwest::Method::POST,
            body: Some(body),
            ..Self::get(path)
        }
    }

    pub fn patch(path: &'a str, body: serde_json::Value) -> Self {
        Self {
            method: reqwest::Method::PATCH,
            body: Some(body),
            ..Self::get(path)
        }
    }

    pub fn user(mut self, user_id: &'a str) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

/// Execute an API request, print the JSON response, return the exit code.
pub async fn api_request(api_url: &str, call: ApiCall<'_>) -> i32 {
    let url = match reqwest::Url::parse(&format!("{api_url}{}", call.path)) {
        Ok(mut u) => {
            if !call.query.is_empty() {
                let mut q = u.query_pairs_mut();
                for (k, v) in &call.query {
                    q.append_pair(k, v);
                }
            }
            u
        }
        Err(e) => {
            print_json(
                &json!({
                    "error": "cli_error",
                    "message": format!("Invalid URL: {api_url}{}: {e}", call.path)
                }),
                true,
            );
            return 4;
        }
    };

    let mut req = client().request(call.method, url);
    if let Some(user_id) = call.user_id {
        req = req.header("x-user-id", user_id);
    }
    for (name, value) in &call.headers {
        req = req.header(*name, value.as_str());
    }
    if let Some(body) = &call.body {
        req = req.json(body);
    }

    let resp = match req.send().await {
        Ok(r) => r,
        Err(e) => {
            print_json(
                &json!({
                    "error": "connection_error",
                    "message": format!("{e}"),
                    "docs_hint": "Is the API server running? Check BEACON_API_URL. \
                                  If you are in crisis right now, call or text 988 or dial 911."
                }),
                true,
            );
            return 3;
        }
    };

    let exit_code = exit_code_for(resp.status().as_u16());
    let body: serde_json::Value = match resp.json().await {
        Ok(v) => v,
        Err(e) => json!({"raw_error": format!("Failed to parse response as JSON: {e}")}),
    };
    print_json(&body, exit_code != 0);
    exit_code
}

/// Read JSON from a file path or stdin (when path is "-").
pub fn read_json_from_file(path: &str) -> Result<serde_json::Value, String> {
    let raw = if path == "-" {
        std::io::read_to_string(std::io::stdin())
            .map_err(|e| format!("Failed to read stdin: {e}"))?
    } else {
        std::fs::read_to_string(path).map_err(|e| format!("Failed to read file '{path}': {e}"))?
    };
    serde_json::from_str(&raw).map_err(|e| format!("Invalid JSON in '{path}': {e}"))
}

pub fn parse_time_of_day(raw: &str) -> Result<TimeOfDay, String> {
    serde_json::from_value(json!(raw.trim().to_lowercase()))
        .map_err(|_| format!("'{raw}' is not one of morning, afternoon, evening, night"))
}

pub fn parse_language(raw: &str) -> Result<Language, String> {
    Language::parse(raw).ok_or_else(|| format!("'{raw}' is not a supported language (en, es)"))
}

pub fn parse_timeframe(raw: &str) -> Result<Timeframe, String> {
    Timeframe::parse(raw)
        .ok_or_else(|| format!("'{raw}' is not one of day, week, month, quarter, year, all"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_exit_codes() {
        assert_eq!(exit_code_for(200), 0);
        assert_eq!(exit_code_for(201), 0);
        assert_eq!(exit_code_for(400), 1);
        assert_eq!(exit_code_for(404), 1);
        assert_eq!(exit_code_for(500), 2);
        assert_eq!(exit_code_for(503), 2);
    }

    #[test]
    fn argument_parsers_accept_wire_names() {
        assert_eq!(parse_time_of_day("Night").unwrap(), TimeOfDay::Night);
        assert!(parse_time_of_day("midnight").is_err());
        assert_eq!(parse_language("es").unwrap(), Language::Es);
        assert_eq!(parse_timeframe("week").unwrap(), Timeframe::Week);
        assert!(parse_timeframe("decade").is_err());
    }

    #[test]
    fn json_files_are_read_and_validated() {
        let dir = std::env::temp_dir();
        let good = dir.join(format!("beacon-cli-{}.json", uuid::Uuid::now_v7()));
        std::fs::write(&good, r#"{"risk_level": "high"}"#).unwrap();
        let value = read_json_from_file(good.to_str().unwrap()).unwrap();
        assert_eq!(value["risk_level"], "high");

        std::fs::write(&good, "{not json").unwrap();
        let err = read_json_from_file(good.to_str().unwrap()).unwrap_err();
        assert!(err.starts_with("Invalid JSON"));
        std::fs::remove_file(&good).unwrap();

        assert!(read_json_from_file("/nonexistent/beacon.json").is_err());
    }
}
