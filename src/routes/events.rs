//! Calendar query endpoints

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};

use evcal_core::{CalendarPage, FilterRequest};

use crate::routes::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/events", get(list_events))
        .route("/events/query", post(query_events))
}

/// GET /events - Query string form (`category.<group>=id1,id2` for categories)
async fn list_events(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<CalendarPage>, AppError> {
    let request = FilterRequest::from_query_pairs(pairs);
    run_query(state, request).await
}

/// POST /events/query - JSON body form
async fn query_events(
    State(state): State<AppState>,
    Json(request): Json<FilterRequest>,
) -> Result<Json<CalendarPage>, AppError> {
    run_query(state, request).await
}

async fn run_query(state: AppState, request: FilterRequest) -> Result<Json<CalendarPage>, AppError> {
    // The engine does blocking store reads
    let page = tokio::task::spawn_blocking(move || state.engine.run(&request)).await??;
    Ok(Json(page))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use chrono::{Duration, Utc};
    use evcal_core::event::AuthoredAttributes;
    use evcal_core::{EngineConfig, EventRecord, InMemoryStore};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    fn app() -> Router {
        let store = Arc::new(InMemoryStore::new());
        let tomorrow = Utc::now().date_naive() + Duration::days(1);
        for (id, genre) in [("jazz-night", "jazz"), ("folk-night", "folk")] {
            let mut record = EventRecord {
                id: id.to_string(),
                title: id.replace('-', " "),
                occurrences: vec![],
                categories: Default::default(),
                venue_id: None,
                organizer_id: None,
                attributes: AuthoredAttributes {
                    start_date: Some(tomorrow),
                    ..Default::default()
                },
                schedule: None,
            };
            record
                .categories
                .insert("genre".to_string(), [genre.to_string()].into());
            store.upsert_event(record);
        }

        router().with_state(AppState::from_store(store, &EngineConfig::default()))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_get_events_with_category_filter() {
        let response = app()
            .oneshot(
                Request::get("/events?category.genre=jazz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["totalEventCount"], 1);
        assert_eq!(json["maxPages"], 1);
        assert_eq!(
            json["groupedByDate"][0]["entries"][0]["event"]["id"],
            "jazz-night"
        );
        assert_eq!(
            json["groupedByDate"][0]["entries"][0]["displayVars"]["timeLabel"],
            "All day"
        );
    }

    #[tokio::test]
    async fn test_post_query_accepts_json_request() {
        let body = serde_json::json!({
            "search": "folk",
            "geo_lat": "not-a-number",
            "geo_lng": -105.0,
        });
        let response = app()
            .oneshot(
                Request::post("/events/query")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["totalEventCount"], 1);
        assert_eq!(json["futureCount"], 1);
        assert_eq!(json["pastCount"], 0);
    }
}
