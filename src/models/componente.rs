// src/models/componente.rs
use serde::{Deserialize, Serialize};
use validator::Validate;
use chrono::{DateTime, Utc};

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Componente {
    pub id: String,
    pub numero_parte: String,
    pub nombre: String,
    pub descripcion: Option<String>,
    pub categoria: Option<String>,
    pub marca: Option<String>,
    pub modelo: Option<String>,
    pub precio_unitario: f64,
    pub stock_actual: i64,
    pub stock_minimo: i64,
    pub activo: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Componente {
    /// Low stock is derived on every read, never stored.
    pub fn bajo_stock(&self) -> bool {
        self.stock_actual <= self.stock_minimo
    }

    pub fn valor_total_stock(&self) -> f64 {
        self.stock_actual as f64 * self.precio_unitario
    }
}

/// Component as rendered to clients, with the derived stock fields.
#[derive(Debug, Serialize, Clone)]
pub struct ComponenteView {
    #[serde(flatten)]
    pub componente: Componente,
    pub bajo_stock: bool,
    pub valor_total_stock: f64,
}

impl From<Componente> for ComponenteView {
    fn from(componente: Componente) -> Self {
        Self {
            bajo_stock: componente.bajo_stock(),
            valor_total_stock: componente.valor_total_stock(),
            componente,
        }
    }
}

#[derive(Debug, Deserialize, Validate, Clone)]
pub struct CreateComponenteRequest {
    #[validate(length(min = 1, max = 100, message = "Part number must be between 1 and 100 characters"))]
    pub numero_parte: String,
    #[validate(length(min = 1, max = 200, message = "Name must be between 1 and 200 characters"))]
    pub nombre: String,
    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    pub descripcion: Option<String>,
    #[validate(length(max = 100, message = "Category cannot exceed 100 characters"))]
    pub categoria: Option<String>,
    #[validate(length(max = 100, message = "Brand cannot exceed 100 characters"))]
    pub marca: Option<String>,
    #[validate(length(max = 100, message = "Model cannot exceed 100 characters"))]
    pub modelo: Option<String>,
    #[validate(range(min = 0.0, message = "Unit price must be non-negative"))]
    pub precio_unitario: Option<f64>,
    #[validate(range(min = 0, message = "Initial stock must be non-negative"))]
    pub stock_inicial: Option<i64>,
    #[validate(range(min = 0, message = "Minimum stock must be non-negative"))]
    pub stock_minimo: Option<i64>,
}

impl CreateComponenteRequest {
    /// Trims text fields so length checks see what gets stored. Blank optionals become None.
    pub fn trimmed(self) -> Self {
        fn optional(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        Self {
            numero_parte: self.numero_parte.trim().to_string(),
            nombre: self.nombre.trim().to_string(),
            descripcion: optional(self.descripcion),
            categoria: optional(self.categoria),
            marca: optional(self.marca),
            modelo: optional(self.modelo),
            ..self
        }
    }
}
