use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One record read from a source, addressed by its source position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordUnit {
    pub index: usize,
    pub data: Value,
}

impl RecordUnit {
    pub fn new(index: usize, data: Value) -> Self {
        Self { index, data }
    }
}

/// Unit of work yielded by a record source
#[derive(Debug, Clone, PartialEq)]
pub enum SourceItem {
    Single(RecordUnit),
    /// Related records, processed together in one transaction. The first
    /// member is the record that was read; the rest were found for it.
    Related(Vec<RecordUnit>),
}

impl SourceItem {
    /// Index the driver checks against the processed set
    pub fn lead_index(&self) -> Option<usize> {
        match self {
            SourceItem::Single(unit) => Some(unit.index),
            SourceItem::Related(units) => units.first().map(|unit| unit.index),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SourceItem::Single(_) => 1,
            SourceItem::Related(units) => units.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn indices(&self) -> Vec<usize> {
        match self {
            SourceItem::Single(unit) => vec![unit.index],
            SourceItem::Related(units) => units.iter().map(|unit| unit.index).collect(),
        }
    }

    /// A group of one is just a single record
    pub fn normalize(self) -> Self {
        match self {
            SourceItem::Related(mut units) if units.len() == 1 => {
                SourceItem::Single(units.remove(0))
            }
            other => other,
        }
    }

    pub fn into_units(self) -> Vec<RecordUnit> {
        match self {
            SourceItem::Single(unit) => vec![unit],
            SourceItem::Related(units) => units,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lead_index() {
        let single = SourceItem::Single(RecordUnit::new(4, json!(5)));
        assert_eq!(single.lead_index(), Some(4));

        let group = SourceItem::Related(vec![
            RecordUnit::new(2, json!(3)),
            RecordUnit::new(6, json!(7)),
        ]);
        assert_eq!(group.lead_index(), Some(2));
        assert_eq!(group.indices(), vec![2, 6]);
        assert_eq!(group.len(), 2);

        assert_eq!(SourceItem::Related(vec![]).lead_index(), None);
    }

    #[test]
    fn test_normalize_group_of_one() {
        let item = SourceItem::Related(vec![RecordUnit::new(0, json!(1))]).normalize();
        assert_eq!(item, SourceItem::Single(RecordUnit::new(0, json!(1))));
    }
}
