use crate::models::Dimensions;
use std::collections::HashSet;

const DIMENSION_UNIT: &str = "inches";
const WEIGHT_UNIT: &str = "oz";
const OUNCES_PER_POUND: f64 = 16.0;

/// Package measurements for one item number, as listed in the release feed.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionRow {
    pub item_number: String,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub weight_lb: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionRow {
    pub origin: String,
    pub sub: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceTables {
    dimensions: Vec<DimensionRow>,
    substitutions: Vec<SubstitutionRow>,
    released: HashSet<String>,
}

impl ReferenceTables {
    pub fn new(
        dimensions: Vec<DimensionRow>,
        substitutions: Vec<SubstitutionRow>,
        released: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            dimensions,
            substitutions,
            released: released
                .into_iter()
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect(),
        }
    }

    pub fn substitutions(&self) -> &[SubstitutionRow] {
        &self.substitutions
    }

    pub fn released_count(&self) -> usize {
        self.released.len()
    }

    pub fn is_released(&self, order_id: &str) -> bool {
        self.released.contains(order_id.trim())
    }

    pub fn resolve_dimensions(&self, sku: &str) -> Option<Dimensions> {
        let key = sku.trim();
        let row = self
            .dimensions
            .iter()
            .find(|row| row.item_number.trim() == key)?;
        Some(Dimensions {
            sku: row.item_number.trim().to_string(),
            length: row.length,
            width: row.width,
            height: row.height,
            unit: DIMENSION_UNIT,
            weight: pounds_to_ounces(row.weight_lb),
            weight_unit: WEIGHT_UNIT,
        })
    }

    /// Substitute SKU for `origin`.
    ///
    /// Only the first substitution row is consulted: a miss on it returns `origin`
    /// even when a later row would match.
    pub fn resolve_substitute(&self, origin: &str) -> String {
        match self.substitutions.first() {
            Some(row) if row.origin == origin => row.sub.clone(),
            _ => origin.to_string(),
        }
    }
}

pub fn pounds_to_ounces(weight_lb: f64) -> u32 {
    (weight_lb * OUNCES_PER_POUND).ceil().max(0.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(item: &str, weight_lb: f64) -> DimensionRow {
        DimensionRow {
            item_number: item.to_string(),
            length: 40.0,
            width: 20.0,
            height: 8.0,
            weight_lb,
        }
    }

    fn sub(origin: &str, sub: &str) -> SubstitutionRow {
        SubstitutionRow {
            origin: origin.to_string(),
            sub: sub.to_string(),
        }
    }

    #[test]
    fn weight_rounds_up_to_whole_ounces() {
        assert_eq!(pounds_to_ounces(1.0), 16);
        assert_eq!(pounds_to_ounces(1.01), 17);
        assert_eq!(pounds_to_ounces(0.0), 0);
        assert_eq!(pounds_to_ounces(22.5), 360);
    }

    #[test]
    fn dimensions_match_trimmed_item_number() {
        let tables = ReferenceTables::new(vec![dims(" MAT-12 ", 30.2), dims("MAT-10", 1.0)], vec![], []);
        let found = tables.resolve_dimensions("MAT-12").expect("dims");
        assert_eq!(found.sku, "MAT-12");
        assert_eq!(found.weight, 484);
        assert_eq!(found.unit, "inches");
        assert_eq!(found.weight_unit, "oz");
        assert!(tables.resolve_dimensions("MAT-99").is_none());
    }

    #[test]
    fn empty_substitution_table_is_identity() {
        let tables = ReferenceTables::default();
        assert_eq!(tables.resolve_substitute("MAT-12"), "MAT-12");
    }

    #[test]
    fn first_substitution_row_is_applied() {
        let tables = ReferenceTables::new(vec![], vec![sub("MAT-12", "MAT-12-B")], []);
        assert_eq!(tables.resolve_substitute("MAT-12"), "MAT-12-B");
    }

    // A later matching row is ignored when the first row misses. Whether this is
    // intended is still open with the warehouse team; the assertion pins current output.
    #[test]
    fn substitute_only_consults_first_row() {
        let tables = ReferenceTables::new(
            vec![],
            vec![sub("MAT-10", "MAT-10-B"), sub("MAT-12", "MAT-12-B")],
            [],
        );
        assert_eq!(tables.resolve_substitute("MAT-12"), "MAT-12");
    }

    #[test]
    fn released_set_ignores_blank_ids() {
        let tables = ReferenceTables::new(
            vec![],
            vec![],
            ["111-2".to_string(), " ".to_string(), " 333-4 ".to_string()],
        );
        assert_eq!(tables.released_count(), 2);
        assert!(tables.is_released("333-4"));
        assert!(!tables.is_released("999-9"));
    }
}
