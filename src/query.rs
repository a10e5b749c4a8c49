/// Renders the Overpass QL query selecting nodes and ways tagged with `tag`
/// inside the administrative area named exactly `city`. Ways are returned with
/// their centroid (`out center`).
///
/// `city` is interpolated verbatim, so it must come from a trusted source: a
/// double quote in the name changes the query.
pub fn build_query(city: &str, tag: &str, server_timeout_secs: u64) -> String {
    format!(
        r#"[out:json][timeout:{server_timeout_secs}];
area[name="{city}"]->.searchArea;
(
  node[{tag}](area.searchArea);
  way[{tag}](area.searchArea);
);
out center;
"#
    )
}
