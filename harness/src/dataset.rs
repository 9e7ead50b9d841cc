use crate::registry::Language;
use serde::{Deserialize, Serialize};

/// Divisor turning an epoch-millisecond id into a fractional cost value.
pub const COST_DIVISOR: f64 = 1_000_999.999;

/// Wire shape for the product rows the sample endpoints read and write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "ProductID")]
    pub product_id: i64,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Cost")]
    pub cost: f64,
}

/// Wire shape for the mapped-item endpoint; the binding's mapping reference
/// lands these columns in the products table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "ItemID")]
    pub item_id: i64,
    #[serde(rename = "ItemName")]
    pub item_name: String,
    #[serde(rename = "ItemCost")]
    pub item_cost: f64,
}

/// One run's generated records: request bodies and the expected-response
/// oracle in one place, so the id that is written is the id that is checked.
#[derive(Debug, Clone)]
pub struct SyntheticDataset {
    pub products: Vec<Product>,
    pub item: Item,
}

pub fn cost_for(id: i64) -> f64 {
    id as f64 / COST_DIVISOR
}

impl SyntheticDataset {
    /// Generates the per-run records from an epoch-millisecond seed: nine
    /// products with ids decreasing from the seed, and one mapped item just
    /// above it. Seeding from the clock keeps ids unique across runs.
    pub fn generate(language: Language, seed_millis: i64) -> Self {
        let products = (1..10)
            .map(|count| {
                let id = seed_millis - count;
                Product {
                    product_id: id,
                    name: format!("Product-{}-{}", language, id),
                    cost: cost_for(id),
                }
            })
            .collect();

        let item_id = seed_millis + 10;
        let item = Item {
            item_id,
            item_name: format!("Item-{}-{}", language, item_id),
            item_cost: cost_for(item_id),
        };

        Self { products, item }
    }

    pub fn item_id(&self) -> i64 {
        self.item.item_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: i64 = 1_675_068_000_000;

    #[test]
    fn generates_nine_products_with_decreasing_ids() {
        let dataset = SyntheticDataset::generate(Language::Node, SEED);
        assert_eq!(dataset.products.len(), 9);
        for (index, product) in dataset.products.iter().enumerate() {
            assert_eq!(product.product_id, SEED - (index as i64 + 1));
        }
        let ids: Vec<i64> = dataset.products.iter().map(|p| p.product_id).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(ids, sorted);
    }

    #[test]
    fn item_id_round_trips_between_write_and_oracle() {
        let dataset = SyntheticDataset::generate(Language::Node, SEED);
        assert_eq!(dataset.item.item_id, SEED + 10);
        assert_eq!(dataset.item_id(), dataset.item.item_id);
        assert_eq!(
            dataset.item.item_name,
            format!("Item-node-{}", dataset.item.item_id)
        );
        assert_eq!(dataset.item.item_cost, cost_for(dataset.item.item_id));
    }

    #[test]
    fn names_embed_the_language_and_id() {
        let dataset = SyntheticDataset::generate(Language::Java, SEED);
        for product in &dataset.products {
            assert_eq!(
                product.name,
                format!("Product-java-{}", product.product_id)
            );
        }
    }

    #[test]
    fn wire_fields_use_pascal_case_names() {
        let dataset = SyntheticDataset::generate(Language::Node, SEED);
        let body = serde_json::to_value(&dataset.products[0]).unwrap();
        assert!(body.get("ProductID").is_some());
        assert!(body.get("Name").is_some());
        assert!(body.get("Cost").is_some());

        let item = serde_json::to_value(&dataset.item).unwrap();
        assert!(item.get("ItemID").is_some());
        assert!(item.get("ItemName").is_some());
        assert!(item.get("ItemCost").is_some());
    }
}
