use beacon_core::analytics::Timeframe;
use serde_json::json;

use crate::util::{ApiCall, api_request, exit_error, read_json_from_file};

pub async fn record(api_url: &str, user_id: &str, file: &str) -> i32 {
    let mut event = read_json_from_file(file).unwrap_or_else(|e| exit_error(&e, None));
    match event.as_object_mut() {
        Some(fields) => {
            fields
                .entry("user_id")
                .or_insert_with(|| json!(user_id));
        }
        None => exit_error("event file must contain a JSON object", None),
    }
    api_request(
        api_url,
        ApiCall::post("/v1/crisis/events", event).user(user_id),
    )
    .await
}

pub async fn history(api_url: &str, user_id: &str, limit: Option<u32>) -> i32 {
    let mut call = ApiCall::get("/v1/crisis/history").user(user_id);
    if let Some(limit) = limit {
        call = call.query("limit", limit);
    }
    api_request(api_url, call).await
}

pub async fn analytics(api_url: &str, user_id: &str, timeframe: Option<Timeframe>) -> i32 {
    let mut call = ApiCall::get("/v1/crisis/analytics").user(user_id);
    if let Some(timeframe) = timeframe {
        let name = serde_json::to_value(timeframe)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| exit_error("could not encode timeframe", None));
        call = call.query("timeframe", name);
    }
    api_request(api_url, call).await
}

pub async fn patterns(api_url: &str, user_id: &str) -> i32 {
    api_request(api_url, ApiCall::get("/v1/crisis/patterns").user(user_id)).await
}
