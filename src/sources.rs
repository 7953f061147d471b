use crate::error::SourceError;
use crate::normalize::{FieldMapping, Provider, RawRecord};
use csv::ReaderBuilder;
use geojson::{GeoJson, Value as GeometryValue};
use serde_json::Value;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing::debug;

pub trait RecordSource {
    fn provider(&self) -> Provider;

    fn fetch(&self) -> Result<Vec<RawRecord>, SourceError>;
}

/// Tabular site export. Empty cells become nulls.
pub struct CsvSiteSource {
    path: PathBuf,
}

impl CsvSiteSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecordSource for CsvSiteSource {
    fn provider(&self) -> Provider {
        Provider::Site
    }

    fn fetch(&self) -> Result<Vec<RawRecord>, SourceError> {
        let file = File::open(&self.path)
            .map_err(|e| SourceError::Unavailable(format!("{:?}: {}", self.path, e)))?;
        let mut rdr = ReaderBuilder::new().flexible(false).from_reader(file);
        let headers = rdr
            .headers()
            .map_err(|e| SourceError::Parse(e.to_string()))?
            .clone();

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| SourceError::Parse(e.to_string()))?;
            let row: RawRecord = headers
                .iter()
                .zip(record.iter())
                .map(|(header, cell)| {
                    let value = if cell.trim().is_empty() {
                        Value::Null
                    } else {
                        Value::String(cell.to_string())
                    };
                    (header.to_string(), value)
                })
                .collect();
            rows.push(row);
        }

        debug!("Read {} site rows from {:?}", rows.len(), self.path);
        Ok(rows)
    }
}

/// Facility export as a GeoJSON FeatureCollection.
///
/// Feature properties are the raw record. When a feature has point geometry
/// and its properties lack the mapped latitude/longitude columns, the point's
/// coordinates are written into those columns.
pub struct GeoJsonFacilitySource {
    path: PathBuf,
    lat_field: String,
    long_field: String,
}

impl GeoJsonFacilitySource {
    pub fn new(path: impl Into<PathBuf>, mapping: &FieldMapping) -> Self {
        Self {
            path: path.into(),
            lat_field: mapping.lat_field.clone(),
            long_field: mapping.long_field.clone(),
        }
    }

    fn rows_from(&self, geojson: GeoJson) -> Result<Vec<RawRecord>, SourceError> {
        let collection = match geojson {
            GeoJson::FeatureCollection(fc) => fc,
            _ => {
                return Err(SourceError::Parse(
                    "facility response must be a FeatureCollection".to_string(),
                ))
            }
        };

        let rows = collection
            .features
            .into_iter()
            .map(|feature| {
                let mut row: RawRecord =
                    feature.properties.unwrap_or_default().into_iter().collect();
                if let Some(GeometryValue::Point(position)) = feature.geometry.map(|g| g.value) {
                    if let [lon, lat, ..] = position.as_slice() {
                        fill_missing(&mut row, &self.long_field, *lon);
                        fill_missing(&mut row, &self.lat_field, *lat);
                    }
                }
                row
            })
            .collect();

        Ok(rows)
    }
}

fn fill_missing(row: &mut RawRecord, field: &str, value: f64) {
    let absent = matches!(row.get(field), None | Some(Value::Null));
    if absent {
        row.insert(field.to_string(), Value::from(value));
    }
}

impl RecordSource for GeoJsonFacilitySource {
    fn provider(&self) -> Provider {
        Provider::Facility
    }

    fn fetch(&self) -> Result<Vec<RawRecord>, SourceError> {
        let file = File::open(&self.path)
            .map_err(|e| SourceError::Unavailable(format!("{:?}: {}", self.path, e)))?;
        let geojson = GeoJson::from_reader(BufReader::new(file))
            .map_err(|e| SourceError::Parse(e.to_string()))?;
        let rows = self.rows_from(geojson)?;
        debug!("Read {} facility features from {:?}", rows.len(), self.path);
        Ok(rows)
    }
}

/// Records already in memory.
pub struct StaticSource {
    provider: Provider,
    records: Vec<RawRecord>,
}

impl StaticSource {
    pub fn new(provider: Provider, records: Vec<RawRecord>) -> Self {
        Self { provider, records }
    }
}

impl RecordSource for StaticSource {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn fetch(&self) -> Result<Vec<RawRecord>, SourceError> {
        Ok(self.records.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use std::io::Write;

    #[test]
    fn test_csv_sites_normalize_into_points() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "MonitoringLocationIdentifier,MonitoringLocationName,MonitoringLocationTypeName,LatitudeMeasure,LongitudeMeasure,HUCEightDigitCode"
        )
        .unwrap();
        writeln!(
            file,
            "UTAHDWQ_WQX-4994790,JORDAN R AT 1700 S,River/Stream,40.7338,-111.9230,16020204"
        )
        .unwrap();
        writeln!(
            file,
            "UTAHDWQ_WQX-4995210,MILL CK AB JORDAN,River/Stream,40.7031,-111.9189,"
        )
        .unwrap();

        let source = CsvSiteSource::new(file.path());
        let rows = source.fetch().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("HUCEightDigitCode"), Some(&Value::Null));

        let points = normalize(source.provider(), &rows, &FieldMapping::site()).unwrap();
        assert_eq!(points[0].location_name, "JORDAN R AT 1700 S");
        assert_eq!(points[1].longitude, -111.9189);
    }

    #[test]
    fn test_missing_csv_is_unavailable() {
        let source = CsvSiteSource::new("/nonexistent/sites.csv");
        assert!(matches!(source.fetch(), Err(SourceError::Unavailable(_))));
    }

    #[test]
    fn test_facility_geometry_fills_coordinates() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature",
                 "properties": {"SourceID": "UT0021725", "CWPName": "CENTRAL VALLEY WRF", "CWPFacilityTypeIndicator": "POTW"},
                 "geometry": {"type": "Point", "coordinates": [-111.92, 40.71]}},
                {"type": "Feature",
                 "properties": {"SourceID": "UT0000051", "CWPName": "KENNECOTT", "CWPFacilityTypeIndicator": "NON-POTW", "FacLat": 40.6, "FacLong": -112.1},
                 "geometry": {"type": "Point", "coordinates": [0.0, 0.0]}}
            ]
        }"#;
        let source = GeoJsonFacilitySource::new("unused.geojson", &FieldMapping::facility());
        let rows = source.rows_from(json.parse().unwrap()).unwrap();

        let points = normalize(Provider::Facility, &rows, &FieldMapping::facility()).unwrap();
        assert_eq!(points[0].latitude, 40.71);
        assert_eq!(points[0].longitude, -111.92);
        assert_eq!(points[1].latitude, 40.6);
        assert_eq!(points[1].location_type, "NON-POTW");
    }

    #[test]
    fn test_facility_response_must_be_collection() {
        let source = GeoJsonFacilitySource::new("unused.geojson", &FieldMapping::facility());
        let point: GeoJson = r#"{"type": "Point", "coordinates": [1.0, 2.0]}"#.parse().unwrap();
        assert!(matches!(source.rows_from(point), Err(SourceError::Parse(_))));
    }
}
