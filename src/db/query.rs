//! Read contract for the choropleth dashboard.
//!
//! Every [`Variable`] maps to a fixed table, column and SQL text, so an
//! unknown name is rejected before any I/O.

use std::{fmt, str::FromStr};

use anyhow::Result;
use chrono::NaiveDate;
use geojson::{Feature, FeatureCollection, JsonObject};
use sqlx::{FromRow, PgPool};

use crate::error::PipelineError;

use super::Source;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variable {
    Tp,
    T2m,
    T2mMin,
    T2mMax,
    MaxNocturnalTemp,
    MinDiurnalTemp,
    DiurnalTempVariation,
    Ndvi,
}

macro_rules! measurement_query {
    ($table:literal, $column:literal) => {
        concat!(
            "SELECT t.town_name, ST_AsGeoJSON(ST_Simplify(t.geometry, 0.0005)) AS geometry, m.",
            $column,
            " AS value FROM ",
            $table,
            " m JOIN towns t ON t.town_id = m.town_id",
            " JOIN time ti ON ti.time_id = m.time_id",
            " WHERE ti.date = $1 ORDER BY t.town_name"
        )
    };
}

macro_rules! dates_query {
    ($table:literal) => {
        concat!(
            "SELECT DISTINCT ti.date FROM ",
            $table,
            " m JOIN time ti ON ti.time_id = m.time_id ORDER BY ti.date"
        )
    };
}

impl Variable {
    pub const ALL: [Variable; 8] = [
        Variable::Tp,
        Variable::T2m,
        Variable::T2mMin,
        Variable::T2mMax,
        Variable::MaxNocturnalTemp,
        Variable::MinDiurnalTemp,
        Variable::DiurnalTempVariation,
        Variable::Ndvi,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Variable::Tp => "tp",
            Variable::T2m => "t2m",
            Variable::T2mMin => "t2m_min",
            Variable::T2mMax => "t2m_max",
            Variable::MaxNocturnalTemp => "max_nocturnal_temp",
            Variable::MinDiurnalTemp => "min_diurnal_temp",
            Variable::DiurnalTempVariation => "diurnal_temp_variation",
            Variable::Ndvi => "ndvi",
        }
    }

    pub fn source(&self) -> Source {
        match self {
            Variable::Ndvi => Source::Modis,
            _ => Source::Era5,
        }
    }

    fn measurement_sql(&self) -> &'static str {
        match self {
            Variable::Tp => measurement_query!("era5_measurements", "tp"),
            Variable::T2m => measurement_query!("era5_measurements", "t2m"),
            Variable::T2mMin => measurement_query!("era5_measurements", "t2m_min"),
            Variable::T2mMax => measurement_query!("era5_measurements", "t2m_max"),
            Variable::MaxNocturnalTemp => {
                measurement_query!("era5_measurements", "max_nocturnal_temp")
            }
            Variable::MinDiurnalTemp => measurement_query!("era5_measurements", "min_diurnal_temp"),
            Variable::DiurnalTempVariation => {
                measurement_query!("era5_measurements", "diurnal_temp_variation")
            }
            Variable::Ndvi => measurement_query!("modis_measurements", "ndvi"),
        }
    }

    fn dates_sql(&self) -> &'static str {
        match self.source() {
            Source::Era5 => dates_query!("era5_measurements"),
            Source::Modis => dates_query!("modis_measurements"),
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Variable {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Variable::ALL
            .into_iter()
            .find(|v| v.name() == s)
            .ok_or_else(|| {
                let expected: Vec<&str> = Variable::ALL.iter().map(|v| v.name()).collect();
                PipelineError::UnknownVariable(s.to_string(), expected.join(", "))
            })
    }
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct TownValue {
    pub town_name: String,
    /// Simplified boundary as GeoJSON text
    pub geometry: String,
    pub value: Option<f32>,
}

pub async fn query_measurements(
    pool: &PgPool,
    variable: Variable,
    date: NaiveDate,
) -> Result<Vec<TownValue>> {
    let rows = sqlx::query_as::<_, TownValue>(variable.measurement_sql())
        .bind(date)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Sorted distinct dates with measurements for the variable's source.
pub async fn valid_dates(pool: &PgPool, variable: Variable) -> Result<Vec<NaiveDate>> {
    let dates: Vec<(NaiveDate,)> = sqlx::query_as(variable.dates_sql()).fetch_all(pool).await?;
    Ok(dates.into_iter().map(|(d,)| d).collect())
}

/// Dashboard payload: one feature per town with `town_name` and `value` properties.
pub fn to_feature_collection(variable: Variable, rows: &[TownValue]) -> Result<FeatureCollection> {
    let features = rows
        .iter()
        .map(|row| {
            let geometry: geojson::Geometry = row.geometry.parse()?;
            let mut properties = JsonObject::new();
            properties.insert("town_name".to_string(), row.town_name.clone().into());
            properties.insert(variable.name().to_string(), row.value.into());

            Ok(Feature {
                bbox: None,
                geometry: Some(geometry),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_every_variable_name() {
        for variable in Variable::ALL {
            assert_eq!(variable.name().parse::<Variable>().unwrap(), variable);
        }
    }

    #[test]
    fn should_reject_unknown_variable() {
        let err = "temperature".parse::<Variable>().unwrap_err();

        assert!(matches!(err, PipelineError::UnknownVariable(ref name, _) if name == "temperature"));
        assert!(err.to_string().contains("t2m_max"));
    }

    #[test]
    fn should_route_ndvi_to_modis_table() {
        assert_eq!(Variable::Ndvi.source(), Source::Modis);
        assert!(Variable::Ndvi.measurement_sql().contains("FROM modis_measurements"));
        assert!(Variable::Ndvi.dates_sql().contains("FROM modis_measurements"));
        assert_eq!(Variable::T2mMin.source(), Source::Era5);
    }

    #[test]
    fn should_select_the_variable_column() {
        for variable in Variable::ALL {
            let sql = variable.measurement_sql();
            assert!(sql.contains(&format!("m.{} AS value", variable.name())));
            assert!(sql.contains(variable.source().table()));
            assert!(variable.source().columns().contains(&variable.name()));
        }
    }

    #[test]
    fn should_build_feature_collection() {
        let rows = vec![TownValue {
            town_name: "Elx".to_string(),
            geometry: r#"{"type":"Point","coordinates":[-0.7,38.27]}"#.to_string(),
            value: Some(1.25),
        }];

        let fc = to_feature_collection(Variable::T2m, &rows).unwrap();

        assert_eq!(fc.features.len(), 1);
        let properties = fc.features[0].properties.as_ref().unwrap();
        assert_eq!(properties["town_name"], "Elx");
        assert_eq!(properties["t2m"], 1.25);
    }
}
