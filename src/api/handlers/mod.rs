pub mod admin;
pub mod enrollments;
pub mod payments;
pub mod plans;
pub mod professors;
pub mod root;
pub mod webhooks;
