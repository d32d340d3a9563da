pub mod quote;
pub mod reference;
