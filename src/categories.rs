/// Categories collected on every run, in query order.
pub const DEFAULT_CATEGORIES: &[&str] = &["кафе", "магазин", "музей", "школа", "аптека"];

pub const FALLBACK_TAG: &str = "amenity=yes";

const CATEGORY_TAGS: &[(&str, &str)] = &[
    ("кафе", "amenity=cafe"),
    ("магазин", "shop=supermarket"),
    ("аптека", "amenity=pharmacy"),
    ("школа", "amenity=school"),
    ("музей", "tourism=museum"),
];

/// Overpass tag filter for a category label. Unknown labels get the generic
/// `amenity=yes` filter instead of an error.
pub fn tag_for(category: &str) -> &'static str {
    CATEGORY_TAGS
        .iter()
        .find(|(label, _)| *label == category)
        .map(|(_, tag)| *tag)
        .unwrap_or(FALLBACK_TAG)
}
