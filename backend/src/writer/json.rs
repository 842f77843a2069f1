//! JSON family formatters.
//!
//! - `json`: an array of objects keyed by field header, multi-valued fields
//!   as arrays
//! - `jsonld`: resources as JSON-LD nodes under `@graph`, with a context
//!   built from the vocabulary prefixes
//! - `geojson`: a feature collection, one point per coordinate value

use super::{Exporter, Formatter};
use crate::error::WriterResult;
use crate::models::{PropertyValue, Resource, ResourceType, DATA_TYPE_COORDINATES};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::io::Write;

/// Plain JSON array of objects.
#[derive(Debug, Clone, Copy)]
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format(&self) -> &'static str {
        "json"
    }

    fn extension(&self) -> &'static str {
        "json"
    }

    fn media_type(&self) -> &'static str {
        "application/json"
    }

    fn write(&self, exporter: &Exporter<'_>, out: &mut dyn Write) -> WriterResult<usize> {
        let headers = exporter.available_fields();
        let mut records = Vec::with_capacity(exporter.count());
        for row in exporter.rows()? {
            let row = row?;
            let mut record = Map::new();
            for (header, mut values) in headers.iter().zip(row.cells) {
                let value = match values.len() {
                    0 => continue,
                    1 => Value::String(values.remove(0)),
                    _ => Value::from(values),
                };
                record.insert(header.to_string(), value);
            }
            records.push(Value::Object(record));
        }
        let count = records.len();
        serde_json::to_writer_pretty(&mut *out, &records)?;
        out.write_all(b"\n")?;
        Ok(count)
    }
}

// =============================================================================
// JSON-LD
// =============================================================================

/// JSON-LD graph of the selected resources.
#[derive(Debug, Clone, Copy)]
pub struct JsonLdFormatter;

impl JsonLdFormatter {
    fn context(exporter: &Exporter<'_>) -> Value {
        let mut context = Map::new();
        context.insert("o".to_string(), json!("http://omeka.org/s/vocabs/o#"));
        for vocabulary in exporter.vocabulary().vocabularies() {
            context.insert(vocabulary.prefix.clone(), json!(vocabulary.namespace_uri));
        }
        Value::Object(context)
    }

    fn node(exporter: &Exporter<'_>, resource: &Resource) -> Value {
        let options = &exporter.config().options;
        let link = |resource_type, id| json!({ "@id": options.resource_url(resource_type, id), "o:id": id });

        let mut node = Map::new();
        if !options.base_url.is_empty() {
            node.insert(
                "@id".to_string(),
                json!(options.resource_url(resource.resource_type, resource.id)),
            );
        }
        let mut types = vec![json!(resource.resource_type.json_ld_type())];
        types.extend(resource.resource_class.iter().map(|c| json!(c)));
        node.insert("@type".to_string(), Value::from(types));
        node.insert("o:id".to_string(), json!(resource.id));
        node.insert("o:is_public".to_string(), json!(resource.is_public));
        if let Some(ref owner) = resource.owner {
            node.insert("o:owner".to_string(), json!(owner));
        }
        if let Some(template) = resource.resource_template {
            node.insert("o:resource_template".to_string(), json!({ "o:id": template }));
        }
        if !resource.item_sets.is_empty() {
            let sets: Vec<Value> = resource
                .item_sets
                .iter()
                .map(|id| link(ResourceType::ItemSets, *id))
                .collect();
            node.insert("o:item_set".to_string(), Value::from(sets));
        }
        if let Some(item) = resource.item {
            node.insert("o:item".to_string(), link(ResourceType::Items, item));
        }
        if !resource.media.is_empty() {
            let media: Vec<Value> = resource
                .media
                .iter()
                .map(|id| link(ResourceType::Media, *id))
                .collect();
            node.insert("o:media".to_string(), Value::from(media));
        }
        if let Some(ref source) = resource.media_source {
            node.insert("o:ingester".to_string(), json!(source.ingester));
            node.insert("o:source".to_string(), json!(source.source));
        }
        for (term, values) in &resource.values {
            let values: Vec<Value> = values.iter().map(|v| Self::value(exporter, term, v)).collect();
            node.insert(term.clone(), Value::from(values));
        }
        Value::Object(node)
    }

    fn value(exporter: &Exporter<'_>, term: &str, value: &PropertyValue) -> Value {
        let mut out = serde_json::to_value(value).unwrap_or(Value::Null);
        if let Value::Object(ref mut map) = out {
            if let Some(property) = exporter.vocabulary().by_term(term) {
                map.insert("property_id".to_string(), json!(property.id));
                map.insert("property_label".to_string(), json!(property.label));
            }
            if let Some(id) = value.resource_id.filter(|_| value.is_resource()) {
                if let Ok(Some(linked)) = exporter.store().get(id) {
                    let options = &exporter.config().options;
                    map.insert(
                        "@id".to_string(),
                        json!(options.resource_url(linked.resource_type, id)),
                    );
                    map.insert("display_title".to_string(), json!(linked.display_title()));
                }
            }
        }
        out
    }
}

impl Formatter for JsonLdFormatter {
    fn format(&self) -> &'static str {
        "jsonld"
    }

    fn extension(&self) -> &'static str {
        "jsonld"
    }

    fn media_type(&self) -> &'static str {
        "application/ld+json"
    }

    fn write(&self, exporter: &Exporter<'_>, out: &mut dyn Write) -> WriterResult<usize> {
        let mut graph = Vec::with_capacity(exporter.count());
        for resource in exporter.resources()? {
            graph.push(Self::node(exporter, &resource?));
        }
        let count = graph.len();
        let document = json!({
            "@context": Self::context(exporter),
            "@graph": graph,
        });
        serde_json::to_writer_pretty(&mut *out, &document)?;
        out.write_all(b"\n")?;
        Ok(count)
    }
}

// =============================================================================
// GeoJSON
// =============================================================================

static WKT_POINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*POINT\s*\(\s*(-?\d+(?:\.\d+)?)\s+(-?\d+(?:\.\d+)?)\s*\)\s*$")
        .expect("valid WKT point regex")
});

static LAT_LNG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(-?\d+(?:\.\d+)?)\s*,\s*(-?\d+(?:\.\d+)?)\s*$").expect("valid lat,lng regex")
});

/// `[longitude, latitude]` of a value, when it holds a point.
///
/// Coordinate values are `lat,lng`; WKT points are `POINT(lng lat)`.
pub fn point_of(value: &PropertyValue) -> Option<[f64; 2]> {
    let text = value.value.as_deref()?;
    let (lng, lat): (f64, f64) = if value.data_type == DATA_TYPE_COORDINATES {
        let caps = LAT_LNG_RE.captures(text)?;
        (caps[2].parse().ok()?, caps[1].parse().ok()?)
    } else {
        let caps = WKT_POINT_RE.captures(text)?;
        (caps[1].parse().ok()?, caps[2].parse().ok()?)
    };
    let valid = (-180.0..=180.0).contains(&lng) && (-90.0..=90.0).contains(&lat);
    valid.then_some([lng, lat])
}

/// GeoJSON feature collection.
#[derive(Debug, Clone, Copy)]
pub struct GeoJsonFormatter;

impl Formatter for GeoJsonFormatter {
    fn format(&self) -> &'static str {
        "geojson"
    }

    fn extension(&self) -> &'static str {
        "geojson"
    }

    fn media_type(&self) -> &'static str {
        "application/geo+json"
    }

    /// Returns the number of resources with at least one feature.
    fn write(&self, exporter: &Exporter<'_>, out: &mut dyn Write) -> WriterResult<usize> {
        let options = &exporter.config().options;
        let mut features = Vec::new();
        let mut count = 0;
        for resource in exporter.resources()? {
            let resource = resource?;
            let before = features.len();
            for (term, values) in &resource.values {
                for point in values.iter().filter_map(point_of) {
                    let mut properties = json!({
                        "o:id": resource.id,
                        "title": resource.display_title(),
                        "property": term,
                    });
                    if !options.base_url.is_empty() {
                        properties["url"] = json!(options.resource_url(resource.resource_type, resource.id));
                    }
                    features.push(json!({
                        "type": "Feature",
                        "geometry": { "type": "Point", "coordinates": point },
                        "properties": properties,
                    }));
                }
            }
            if features.len() > before {
                count += 1;
            }
        }
        let collection = json!({ "type": "FeatureCollection", "features": features });
        serde_json::to_writer_pretty(&mut *out, &collection)?;
        out.write_all(b"\n")?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::tests::sample_store;
    use crate::writer::ExportConfig;

    fn write(formatter: &dyn Formatter, config: ExportConfig) -> (usize, Value) {
        let store = sample_store();
        let exporter = Exporter::new(&store, config).unwrap();
        let mut out = Vec::new();
        let count = formatter.write(&exporter, &mut out).unwrap();
        (count, serde_json::from_slice(&out).unwrap())
    }

    #[test]
    fn test_json_records() {
        let config = ExportConfig {
            include: vec!["dcterms:title".into(), "dcterms:subject".into(), "bibo:isbn".into()],
            ..ExportConfig::default()
        };
        let (count, value) = write(&JsonFormatter, config);
        assert_eq!(count, 2);
        assert_eq!(
            value,
            json!([
                { "dcterms:title": "A", "dcterms:subject": ["x", "y"] },
                { "dcterms:title": "B", "bibo:isbn": "978" },
            ])
        );
    }

    #[test]
    fn test_jsonld_graph() {
        let (count, value) = write(&JsonLdFormatter, ExportConfig::default());
        assert_eq!(count, 2);
        assert_eq!(value["@context"]["dcterms"], "http://purl.org/dc/terms/");
        let first = &value["@graph"][0];
        assert_eq!(first["@type"][0], "o:Item");
        assert_eq!(first["dcterms:title"][0]["@value"], "A");
        assert_eq!(first["dcterms:title"][0]["property_label"], "Title");
        assert_eq!(first["o:item_set"][0]["o:id"], 1);
    }

    #[test]
    fn test_point_parsing() {
        let mut coordinates = PropertyValue::literal("48.85, 2.35");
        coordinates.data_type = DATA_TYPE_COORDINATES.to_string();
        assert_eq!(point_of(&coordinates), Some([2.35, 48.85]));
        assert_eq!(point_of(&PropertyValue::literal("POINT(2.35 48.85)")), Some([2.35, 48.85]));
        assert_eq!(point_of(&PropertyValue::literal("48.85, 2.35")), None);
        coordinates.value = Some("95,10".into());
        assert_eq!(point_of(&coordinates), None);
    }

    #[test]
    fn test_geojson_features() {
        let (count, value) = write(&GeoJsonFormatter, ExportConfig::default());
        assert_eq!(count, 1);
        assert_eq!(value["type"], "FeatureCollection");
        let feature = &value["features"][0];
        assert_eq!(feature["geometry"]["coordinates"], json!([2.35, 48.85]));
        assert_eq!(feature["properties"]["title"], "A");
        assert_eq!(feature["properties"]["property"], "dcterms:spatial");
    }
}
