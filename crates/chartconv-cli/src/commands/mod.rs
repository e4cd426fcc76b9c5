pub mod convert;
pub mod detect;
