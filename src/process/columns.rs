//! Column name resolution for a registry export whose headers drift
//! (accents, casing, wording) between downloads.

use crate::process::utils::fold_text;

pub const DEFAULT_DATE_COLUMN: &str = "Fecha Publicación";
pub const DEFAULT_PROCEDURE_COLUMN: &str = "Procedimiento Concursal";
pub const DEFAULT_PUBLICATION_COLUMN: &str = "Nombre Publicación";

/// One resolution step: a column matches when its folded name contains
/// every fragment in `all_of`.
struct ColumnRule {
    all_of: &'static [&'static str],
}

const DATE_RULES: &[ColumnRule] = &[
    ColumnRule { all_of: &["fecha"] },
    ColumnRule { all_of: &["publicacion"] },
];

const PROCEDURE_RULES: &[ColumnRule] = &[ColumnRule {
    all_of: &["procedimiento", "concursal"],
}];

const PUBLICATION_RULES: &[ColumnRule] = &[ColumnRule {
    all_of: &["nombre", "publicacion"],
}];

/// Rules are tried in order; within a rule the first matching column wins.
fn resolve<'a, I>(columns: I, rules: &[ColumnRule], default: &str) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let folded: Vec<(&str, String)> = columns.into_iter().map(|c| (c, fold_text(c))).collect();

    rules
        .iter()
        .find_map(|rule| {
            folded
                .iter()
                .find(|(_, f)| rule.all_of.iter().all(|frag| f.contains(frag)))
                .map(|(name, _)| name.to_string())
        })
        .unwrap_or_else(|| default.to_string())
}

/// The publication-date column, or `"Fecha Publicación"` when nothing matches.
pub fn resolve_date_column<'a, I>(columns: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    resolve(columns, DATE_RULES, DEFAULT_DATE_COLUMN)
}

pub fn resolve_procedure_column<'a, I>(columns: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    resolve(columns, PROCEDURE_RULES, DEFAULT_PROCEDURE_COLUMN)
}

pub fn resolve_publication_column<'a, I>(columns: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    resolve(columns, PUBLICATION_RULES, DEFAULT_PUBLICATION_COLUMN)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTRY: &[&str] = &[
        "Rol",
        "Procedimiento Concursal",
        "Deudor",
        "RUT",
        "Veedor Liquidador Titular",
        "Nombre Publicación",
        "Tribunal",
        "Fecha Publicación",
    ];

    #[test]
    fn test_date_column_prefers_fecha() {
        assert_eq!(resolve_date_column(REGISTRY.iter().copied()), "Fecha Publicación");
        // "fecha" outranks an earlier "publicación" column
        assert_eq!(resolve_date_column(["Nombre Publicación", "FECHA"]), "FECHA");
    }

    #[test]
    fn test_date_column_falls_back_to_publicacion_then_default() {
        assert_eq!(resolve_date_column(["Rol", "Publicacion"]), "Publicacion");
        assert_eq!(resolve_date_column(["Rol", "Deudor"]), DEFAULT_DATE_COLUMN);
        assert_eq!(resolve_date_column(std::iter::empty()), DEFAULT_DATE_COLUMN);
    }

    #[test]
    fn test_text_columns_tolerate_accent_drift() {
        let cols = ["PROCEDIMIENTO CONCURSAL", "Nombre Publicacion", "Fecha"];
        assert_eq!(resolve_procedure_column(cols), "PROCEDIMIENTO CONCURSAL");
        assert_eq!(resolve_publication_column(cols), "Nombre Publicacion");
        assert_eq!(resolve_publication_column(["Rol"]), DEFAULT_PUBLICATION_COLUMN);
    }
}
