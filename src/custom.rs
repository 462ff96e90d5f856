#[doc = "The purge policy authorizes and runs cache purge requests."]
pub mod purge;
