use rocket::serde::Serialize;
use rocket::serde::json::Json;
use rocket::{Request, catch};

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
pub struct Error {
    pub message: String,
}

#[catch(404)]
pub fn not_found(_: &Request) -> Json<Error> {
    Json(Error {
        message: "Not found".to_string(),
    })
}

#[catch(409)]
pub fn conflict(_: &Request) -> Json<Error> {
    Json(Error {
        message: "Conflict".to_string(),
    })
}

#[catch(401)]
pub fn unauthorized(_: &Request) -> Json<Error> {
    Json(Error {
        message: "Unauthorized".to_string(),
    })
}

#[catch(403)]
pub fn forbidden(_: &Request) -> Json<Error> {
    Json(Error {
        message: "Forbidden".to_string(),
    })
}

#[catch(503)]
pub fn service_unavailable(_: &Request) -> Json<Error> {
    Json(Error {
        message: "Service unavailable".to_string(),
    })
}
