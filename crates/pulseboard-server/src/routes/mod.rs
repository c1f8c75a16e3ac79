pub mod breakdown;
pub mod dimensions;
pub mod health;
pub mod ignore_rules;
pub mod summary;
