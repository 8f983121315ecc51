pub mod alert;
pub mod case;
pub mod status;
