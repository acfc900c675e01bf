// src/models/movimiento.rs
use serde::{Deserialize, Serialize};
use validator::Validate;
use chrono::{DateTime, NaiveDate, Utc};
use strum::{AsRefStr, Display, EnumIter, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
    EnumString, Display, AsRefStr, EnumIter, sqlx::Type,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TipoMovimiento {
    /// Inbound delta.
    Entrada,
    /// Outbound delta, may not drive stock negative.
    Salida,
    /// Absolute correction to a counted quantity.
    Ajuste,
}

impl TipoMovimiento {
    pub fn label(&self) -> &'static str {
        match self {
            TipoMovimiento::Entrada => "Entrada",
            TipoMovimiento::Salida => "Salida",
            TipoMovimiento::Ajuste => "Ajuste",
        }
    }
}

/// One immutable row of the stock ledger.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct MovimientoStock {
    pub id: String,
    pub componente_id: String,
    pub tipo: TipoMovimiento,
    /// Requested amount for entrada/salida, signed delta for ajuste.
    pub cantidad: i64,
    pub cantidad_anterior: i64,
    pub cantidad_nueva: i64,
    pub motivo: Option<String>,
    pub observaciones: Option<String>,
    pub usuario: Option<String>,
    pub fecha: DateTime<Utc>,
}

/// Request to apply a movement. `tipo` stays a string so unknown values reach
/// the ledger and come back as invalid arguments.
#[derive(Debug, Deserialize, Validate, Clone)]
pub struct NuevoMovimiento {
    #[validate(length(min = 1, message = "Component ID is required"))]
    pub componente_id: String,
    #[serde(alias = "tipo_movimiento")]
    pub tipo: String,
    pub cantidad: i64,
    #[validate(length(max = 200, message = "Reason cannot exceed 200 characters"))]
    pub motivo: Option<String>,
    #[validate(length(max = 1000, message = "Notes cannot exceed 1000 characters"))]
    pub observaciones: Option<String>,
    #[validate(length(max = 100, message = "User cannot exceed 100 characters"))]
    pub usuario: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MovimientoResultado {
    pub stock_actual: i64,
    pub bajo_stock: bool,
    pub movimiento: MovimientoStock,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct MovimientoFilter {
    pub componente_id: Option<String>,
    pub tipo: Option<String>,
    pub fecha_desde: Option<NaiveDate>,
    pub fecha_hasta: Option<NaiveDate>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ResumenMovimientos {
    pub componente_id: String,
    pub total_movimientos: i64,
    pub total_entradas: i64,
    pub total_salidas: i64,
    pub total_ajustes: i64,
    pub stock_actual: i64,
    pub ultimo_movimiento: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct TipoMovimientoInfo {
    pub valor: TipoMovimiento,
    pub label: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_tipo_parsing() {
        assert_eq!(TipoMovimiento::from_str("entrada").unwrap(), TipoMovimiento::Entrada);
        assert_eq!(TipoMovimiento::from_str("SALIDA").unwrap(), TipoMovimiento::Salida);
        assert_eq!(TipoMovimiento::from_str("Ajuste").unwrap(), TipoMovimiento::Ajuste);
        assert!(TipoMovimiento::from_str("compra").is_err());
        assert!(TipoMovimiento::from_str("").is_err());
    }

    #[test]
    fn test_tipo_as_str_matches_schema() {
        let values: Vec<String> = TipoMovimiento::iter().map(|t| t.to_string()).collect();
        assert_eq!(values, vec!["entrada", "salida", "ajuste"]);
        assert_eq!(TipoMovimiento::Salida.as_ref(), "salida");
    }

    #[test]
    fn test_request_accepts_legacy_field_name() {
        let json = r#"{"componente_id": "c1", "tipo_movimiento": "entrada", "cantidad": 4}"#;
        let request: NuevoMovimiento = serde_json::from_str(json).unwrap();
        assert_eq!(request.tipo, "entrada");
        assert_eq!(request.cantidad, 4);
        assert!(request.motivo.is_none());
    }
}
