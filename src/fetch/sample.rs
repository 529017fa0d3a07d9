use anyhow::{anyhow, Result};
use chrono::{Duration, NaiveDate};
use std::path::Path;
use tracing::info;

use crate::fetch::cache::write_atomic;

const HEADERS: [&str; 8] = [
    "Rol",
    "Procedimiento Concursal",
    "Deudor",
    "RUT",
    "Veedor Liquidador Titular",
    "Nombre Publicación",
    "Tribunal",
    "Fecha Publicación",
];

/// (rol, procedimiento, deudor, rut, veedor, publicación, tribunal, days before today)
const ROWS: &[(&str, &str, &str, &str, &str, &str, &str, i64)] = &[
    (
        "C-101-2024",
        "Renegociación de la Persona Deudora",
        "María González Rojas",
        "12345678-9",
        "",
        "Resolución de Admisibilidad",
        "Superintendencia de Insolvencia y Reemprendimiento",
        2,
    ),
    (
        "C-102-2024",
        "Renegociación de la Persona Deudora",
        "Pedro Muñoz Soto",
        "87654321-0",
        "",
        "Antecedentes Resolución de Admisibilidad",
        "Superintendencia de Insolvencia y Reemprendimiento",
        3,
    ),
    (
        "C-201-2024",
        "Liquidación Voluntaria de la Persona Deudora",
        "Comercial Andes Ltda.",
        "76543210-K",
        "Ana Pérez Lagos",
        "Resolución de Liquidación",
        "1° Juzgado Civil de Santiago",
        4,
    ),
    (
        "C-202-2024",
        "Liquidación Voluntaria de la Empresa Deudora",
        "Servicios del Sur SpA",
        "77777777-7",
        "Luis Vera Díaz",
        "Antecedentes de la Resolución de Liquidación",
        "2° Juzgado Civil de Concepción",
        5,
    ),
    (
        "C-301-2024",
        "Liquidación Forzosa de la Empresa Deudora",
        "Transportes Norte S.A.",
        "96000000-1",
        "Carla Ríos Fuentes",
        "Resolución de Liquidación",
        "3° Juzgado Civil de Antofagasta",
        6,
    ),
    (
        "C-401-2024",
        "Reorganización de la Empresa Deudora",
        "Agrícola Valle Central Ltda.",
        "78888888-8",
        "Jorge Araya Pino",
        "Resolución de Reorganización",
        "1° Juzgado Civil de Talca",
        7,
    ),
];

/// Demo registry in the portal's own layout, dated relative to `today` so the
/// default window shows it.
pub fn sample_csv(today: NaiveDate) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(HEADERS)?;
    for &(rol, proc, deudor, rut, veedor, publ, tribunal, days_ago) in ROWS {
        let date = (today - Duration::days(days_ago)).format("%d/%m/%Y").to_string();
        wtr.write_record([rol, proc, deudor, rut, veedor, publ, tribunal, date.as_str()])?;
    }
    wtr.into_inner()
        .map_err(|e| anyhow!("finishing sample CSV: {}", e.error()))
}

/// Write the demo registry to `dest`.
pub fn write_sample(dest: &Path, today: NaiveDate) -> Result<()> {
    let bytes = sample_csv(today)?;
    write_atomic(dest, &bytes)?;
    info!(path = %dest.display(), rows = ROWS.len(), "sample data written");
    Ok(())
}
