// src/models/mod.rs

pub mod componente;
pub mod movimiento;

pub use componente::*;
pub use movimiento::*;
