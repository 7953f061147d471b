use crate::compose::MapArtifact;
use crate::config::OutputConfig;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;

const LEAFLET_VERSION: &str = "1.9.4";
const MEASURE_VERSION: &str = "3.1.0";

/// Renders the artifact as a standalone Leaflet page.
///
/// The artifact is embedded as JSON and the page script builds base layers,
/// overlays, the layer control, legends, the search box and the measure tool
/// from it.
pub fn render_html(artifact: &MapArtifact) -> Result<String> {
    let data = serde_json::to_string(artifact).context("Failed to serialize map artifact")?;
    // Keep the payload from closing its own script element
    let data = data.replace("</", "<\\/");

    let mut html = String::with_capacity(data.len() + PAGE_SCRIPT.len() + 2048);
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\"/>\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\"/>\n");
    html.push_str(&format!("<title>{}</title>\n", escape_text(&artifact.title)));
    html.push_str(&format!(
        "<link rel=\"stylesheet\" href=\"https://unpkg.com/leaflet@{LEAFLET_VERSION}/dist/leaflet.css\"/>\n"
    ));
    html.push_str(&format!(
        "<script src=\"https://unpkg.com/leaflet@{LEAFLET_VERSION}/dist/leaflet.js\"></script>\n"
    ));
    if artifact.measure.enabled {
        html.push_str(&format!(
            "<link rel=\"stylesheet\" href=\"https://unpkg.com/leaflet-measure@{MEASURE_VERSION}/dist/leaflet-measure.css\"/>\n"
        ));
        html.push_str(&format!(
            "<script src=\"https://unpkg.com/leaflet-measure@{MEASURE_VERSION}/dist/leaflet-measure.js\"></script>\n"
        ));
    }
    html.push_str(PAGE_STYLE);
    html.push_str("</head>\n<body>\n<div id=\"map\"></div>\n");
    html.push_str("<script id=\"map-data\" type=\"application/json\">");
    html.push_str(&data);
    html.push_str("</script>\n<script>\n");
    html.push_str(PAGE_SCRIPT);
    html.push_str("</script>\n</body>\n</html>\n");
    Ok(html)
}

/// Writes the HTML page, and the artifact JSON when configured.
pub fn write_outputs(output: &OutputConfig, artifact: &MapArtifact) -> Result<()> {
    let html = render_html(artifact)?;
    write_file(&output.html, &html)?;
    info!("Wrote map page to {:?}", output.html);

    if let Some(path) = &output.artifact_json {
        let json =
            serde_json::to_string_pretty(artifact).context("Failed to serialize map artifact")?;
        write_file(path, &json)?;
        info!("Wrote map artifact to {:?}", path);
    }
    Ok(())
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    fs::write(path, contents).with_context(|| format!("Failed to write {:?}", path))
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

const PAGE_STYLE: &str = r#"<style>
html, body, #map { height: 100%; margin: 0; }
.map-legend, .map-search { background: white; padding: 6px 8px; border-radius: 4px; box-shadow: 0 1px 4px rgba(0,0,0,0.3); font: 12px sans-serif; }
.map-legend i { display: inline-block; width: 10px; height: 10px; border-radius: 50%; margin-right: 6px; }
.map-search input { width: 200px; }
.map-search ul { list-style: none; margin: 4px 0 0; padding: 0; max-height: 200px; overflow-y: auto; }
.map-search li { cursor: pointer; padding: 2px 0; }
.site-label { background: none; border: none; box-shadow: none; font: bold 11px sans-serif; }
</style>
"#;

const PAGE_SCRIPT: &str = r#"
const data = JSON.parse(document.getElementById('map-data').textContent);
const map = L.map('map');
if (data.bounds) {
  map.fitBounds([[data.bounds[1], data.bounds[0]], [data.bounds[3], data.bounds[2]]]);
} else {
  map.setView([39.5, -111.5], 7);
}

const bases = {};
for (const base of data.base_layers) {
  bases[base.name] = L.tileLayer(base.url_template, { attribution: base.attribution, maxZoom: base.max_zoom });
}
bases[data.control.active_base].addTo(map);

function popupFor(feature) {
  return feature.popup ? feature.popup : null;
}

// Same tiers as SearchIndex::search: exact, prefix, substring on id or name
function rankEntry(entry, needle) {
  let best = null;
  for (const field of [entry.id.toLowerCase(), entry.name.toLowerCase()]) {
    const rank = field === needle ? 0
      : field.startsWith(needle) ? 1
      : field.includes(needle) ? 2
      : null;
    if (rank !== null && (best === null || rank < best)) best = rank;
  }
  return best;
}

function searchEntries(query) {
  const needle = query.trim().toLowerCase();
  if (!needle) return [];
  return data.search.entries
    .map((entry) => [rankEntry(entry, needle), entry])
    .filter(([rank]) => rank !== null)
    .sort((a, b) => a[0] - b[0])
    .map(([, entry]) => entry);
}

function buildLayer(layer) {
  const group = L.featureGroup();
  for (const feature of layer.features) {
    const g = feature.geometry;
    let item;
    if (layer.geometry_type === 'label') {
      item = L.marker([g.lat, g.lon], { opacity: 0, interactive: false })
        .bindTooltip(feature.label, { permanent: true, direction: 'right', className: 'site-label' });
    } else if (g.type === 'point') {
      item = L.circleMarker([g.lat, g.lon], {
        radius: layer.style.radius,
        color: feature.color || layer.style.color,
        fillColor: feature.color || layer.style.color,
        weight: layer.style.weight,
        opacity: layer.style.opacity,
        fillOpacity: layer.style.fill_opacity,
        interactive: layer.interactive,
      });
    } else {
      item = L.geoJSON(g.boundary, {
        style: {
          color: layer.style.color,
          weight: layer.style.weight,
          opacity: layer.style.opacity,
          fillOpacity: layer.style.fill_opacity,
        },
        interactive: layer.interactive,
      });
    }
    const popup = layer.interactive ? popupFor(feature) : null;
    if (popup) item.bindPopup(popup);
    item.addTo(group);
  }
  return group;
}

const overlays = {};
const built = {};
for (const layer of data.overlays) {
  built[layer.name] = buildLayer(layer);
}
for (const name of data.control.overlays) {
  overlays[name] = built[name];
}
for (const name of data.control.enable_order) {
  built[name].addTo(map);
}
L.control.layers(bases, overlays, { collapsed: false }).addTo(map);

// Most recently enabled overlay draws on top and takes clicks first
map.on('overlayadd', (e) => { if (e.layer.bringToFront) e.layer.bringToFront(); });

for (const legend of data.legends) {
  const control = L.control({ position: 'bottomright' });
  control.onAdd = () => {
    const div = L.DomUtil.create('div', 'map-legend');
    // Legend text arrives HTML-escaped
    div.innerHTML = '<b>' + legend.title + '</b><br/>' + legend.entries
      .map((entry) => '<i style="background:' + entry.color + '"></i>' + entry.label)
      .join('<br/>');
    return div;
  };
  control.addTo(map);
  const layer = built[legend.layer];
  map.on('overlayremove', (e) => { if (e.layer === layer) control.remove(); });
  map.on('overlayadd', (e) => { if (e.layer === layer) control.addTo(map); });
}

if (data.measure.enabled && L.control.measure) {
  L.control.measure({
    position: data.measure.position,
    primaryLengthUnit: data.measure.primary_length_unit,
    secondaryLengthUnit: data.measure.secondary_length_unit,
    primaryAreaUnit: data.measure.primary_area_unit,
  }).addTo(map);
}

const search = L.control({ position: 'topright' });
search.onAdd = () => {
  const div = L.DomUtil.create('div', 'map-search');
  div.innerHTML = '<input type="text" placeholder="Search by ID or name"/><ul></ul>';
  L.DomEvent.disableClickPropagation(div);
  const input = div.querySelector('input');
  const list = div.querySelector('ul');
  input.addEventListener('input', () => {
    list.innerHTML = '';
    searchEntries(input.value)
      .slice(0, 20)
      .forEach((entry) => {
        const li = document.createElement('li');
        li.textContent = entry.id + ' - ' + entry.name;
        li.addEventListener('click', () => {
          map.setView([entry.lat, entry.lon], data.search.zoom);
          if (entry.popup) L.popup().setLatLng([entry.lat, entry.lon]).setContent(entry.popup).openOn(map);
          list.innerHTML = '';
        });
        list.appendChild(li);
      });
  });
  return div;
};
search.addTo(map);
"#;
