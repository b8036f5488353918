//! Town boundaries read from a GeoJSON FeatureCollection.

use std::{collections::HashSet, fs, path::Path};

use anyhow::{anyhow, bail, Result};
use geo::{BoundingRect, MultiPolygon, Rect};
use geojson::{GeoJson, JsonObject};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct Town {
    pub name: String,
    pub province: Option<String>,
    pub region: Option<String>,
    pub geometry: MultiPolygon<f64>,
    pub bbox: Rect<f64>,
}

impl Town {
    pub fn new(
        name: String,
        province: Option<String>,
        region: Option<String>,
        geometry: MultiPolygon<f64>,
    ) -> Result<Self> {
        let bbox = geometry
            .bounding_rect()
            .ok_or_else(|| anyhow!("Town `{}` has an empty geometry", name))?;

        Ok(Town {
            name,
            province,
            region,
            geometry,
            bbox,
        })
    }

    /// Geometry as GeoJSON text, ready for `ST_GeomFromGeoJSON`.
    pub fn geometry_geojson(&self) -> Result<String> {
        let geometry = geojson::Geometry::new(geojson::Value::from(&self.geometry));
        Ok(serde_json::to_string(&geometry)?)
    }
}

pub fn load_towns(file_path: &Path) -> Result<Vec<Town>> {
    let text = fs::read_to_string(file_path)
        .map_err(|e| anyhow!("Failed to read {}: {}", file_path.display(), e))?;
    parse_towns(&text)
}

pub fn parse_towns(text: &str) -> Result<Vec<Town>> {
    let collection = match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => fc,
        _ => bail!("Town boundaries must be a GeoJSON FeatureCollection"),
    };

    let mut towns = Vec::with_capacity(collection.features.len());
    let mut seen = HashSet::new();

    for (idx, feature) in collection.features.into_iter().enumerate() {
        let properties = feature.properties.unwrap_or_default();
        let (name, province, region) = town_attributes(&properties)
            .ok_or_else(|| anyhow!("Feature {} has no town name", idx))?;

        let geometry = feature
            .geometry
            .ok_or_else(|| anyhow!("Town `{}` has no geometry", name))?;
        let geometry = match geo::Geometry::<f64>::try_from(geometry.value)? {
            geo::Geometry::Polygon(polygon) => MultiPolygon(vec![polygon]),
            geo::Geometry::MultiPolygon(multi) => multi,
            _ => bail!("Town `{}` is not a (multi)polygon", name),
        };

        if !seen.insert(name.clone()) {
            bail!("Duplicate town name `{}`", name);
        }
        towns.push(Town::new(name, province, region, geometry)?);
    }

    debug!("Parsed {} towns", towns.len());

    Ok(towns)
}

/// `(town_name, province, region)` from either normalised properties or the
/// national registry's `NAMEUNIT*` columns.
fn town_attributes(properties: &JsonObject) -> Option<(String, Option<String>, Option<String>)> {
    let text = |key: &str| properties.get(key).and_then(|v| v.as_str()).map(str::to_string);

    if let Some(name) = text("town_name") {
        return Some((name, text("province"), text("region")));
    }

    let name = text("NAMEUNIT")?;
    let province = text("NAMEUNIT_2").map(|p| normalise_province(&p));
    let region = text("NAMEUNIT_3").map(|r| normalise_region(&r));
    Some((name, province, region))
}

/// Bilingual names are `a/b`; provinces keep the first form.
pub fn normalise_province(raw: &str) -> String {
    raw.split('/').next().unwrap_or(raw).to_string()
}

/// Regions keep the last bilingual form.
pub fn normalise_region(raw: &str) -> String {
    match raw.rsplit('/').next().unwrap_or(raw) {
        "Comunitat Valenciana" => "País Valencià".to_string(),
        other => other.to_string(),
    }
}

// -- Tests -------------------------------------------------------------------
