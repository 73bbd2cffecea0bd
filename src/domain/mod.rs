pub mod audit;
pub mod enrollment;
pub mod payment;
pub mod plan;
pub mod professor;
pub mod webhook;

pub use audit::*;
pub use enrollment::*;
pub use payment::*;
pub use plan::*;
pub use professor::*;
pub use webhook::*;
