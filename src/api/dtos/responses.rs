use serde::Serialize;

#[derive(Serialize)]
pub struct AvailabilityResponse {
    pub available: bool,
    pub conflicting_court_ids: Vec<String>,
    pub free_court_ids: Vec<String>,
}

#[derive(Serialize)]
pub struct ReversalResponse {
    pub reservation_id: String,
    pub reversed: u32,
}
