use rocket::get;
use rocket::serde::json::Json;

#[get("/up")]
pub fn up() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "queryops",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// --- Catchers ---

#[rocket::catch(404)]
pub fn not_found() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "Not found"}))
}

#[rocket::catch(401)]
pub fn unauthorized() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "Unauthorized"}))
}

#[rocket::catch(400)]
pub fn bad_request() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "Bad request"}))
}

// Rocket answers 422 for JSON bodies that fail to parse; the agent wire
// contract wants a plain 400 for malformed payloads.
#[rocket::catch(422)]
pub fn unprocessable() -> (rocket::http::Status, Json<serde_json::Value>) {
    (
        rocket::http::Status::BadRequest,
        Json(serde_json::json!({"error": "Bad request"})),
    )
}
