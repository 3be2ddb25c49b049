//! Searching, sorting and paginating item lists.

use core::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::item::InventoryItem;

pub const DEFAULT_PER_PAGE: usize = 20;
pub const MAX_PER_PAGE: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    Name,
    Sku,
    Quantity,
    Supplier,
    CreatedAt,
    UpdatedAt,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// List request: free-text search, filters, ordering and page window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemQuery {
    /// Case-insensitive substring matched against name, SKU and supplier.
    #[serde(rename = "q")]
    pub search: Option<String>,
    pub supplier: Option<String>,
    #[serde(rename = "low_stock")]
    pub low_stock_only: bool,
    pub sort: SortField,
    pub order: SortOrder,
    pub page: usize,
    pub per_page: usize,
}

impl Default for ItemQuery {
    fn default() -> Self {
        Self {
            search: None,
            supplier: None,
            low_stock_only: false,
            sort: SortField::default(),
            order: SortOrder::default(),
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

/// One page of results plus the totals needed to render pagination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub total_pages: usize,
}

impl ItemQuery {
    fn normalized_needle(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    pub fn effective_per_page(&self) -> usize {
        self.per_page.clamp(1, MAX_PER_PAGE)
    }

    pub fn effective_page(&self) -> usize {
        self.page.max(1)
    }

    pub fn matches(&self, item: &InventoryItem) -> bool {
        if self.low_stock_only && !item.is_low_stock() {
            return false;
        }

        if let Some(supplier) = self.supplier.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let same = item
                .supplier
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case(supplier));
            if !same {
                return false;
            }
        }

        match self.normalized_needle() {
            None => true,
            Some(needle) => [Some(item.name.as_str()), item.sku.as_deref(), item.supplier.as_deref()]
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(&needle)),
        }
    }

    /// Filter, sort and slice `items` into a page.
    pub fn run(&self, items: Vec<InventoryItem>) -> Page<InventoryItem> {
        let mut matched: Vec<InventoryItem> = items.into_iter().filter(|i| self.matches(i)).collect();
        sort_items(&mut matched, self.sort, self.order);
        paginate(matched, self.effective_page(), self.effective_per_page())
    }
}

fn cmp_optional_text(a: Option<&str>, b: Option<&str>) -> Ordering {
    // Missing values sort after present ones.
    match (a, b) {
        (Some(a), Some(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Sort in place. Ties fall back to the item id so the order is total.
pub fn sort_items(items: &mut [InventoryItem], field: SortField, order: SortOrder) {
    items.sort_by(|a, b| {
        let primary = match field {
            SortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortField::Sku => cmp_optional_text(a.sku.as_deref(), b.sku.as_deref()),
            SortField::Quantity => a.quantity.cmp(&b.quantity),
            SortField::Supplier => cmp_optional_text(a.supplier.as_deref(), b.supplier.as_deref()),
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        };
        let primary = match order {
            SortOrder::Asc => primary,
            SortOrder::Desc => primary.reverse(),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    });
}

pub fn paginate<T>(items: Vec<T>, page: usize, per_page: usize) -> Page<T> {
    let per_page = per_page.max(1);
    let page = page.max(1);
    let total = items.len();
    let total_pages = total.div_ceil(per_page);
    let start = (page - 1).saturating_mul(per_page);

    let items = items.into_iter().skip(start).take(per_page).collect();

    Page {
        items,
        page,
        per_page,
        total,
        total_pages,
    }
}

/// Items at or below their threshold, worst shortfall first.
pub fn low_stock(items: impl IntoIterator<Item = InventoryItem>) -> Vec<InventoryItem> {
    let mut low: Vec<InventoryItem> = items.into_iter().filter(|i| i.is_low_stock()).collect();
    low.sort_by(|a, b| {
        b.shortfall()
            .cmp(&a.shortfall())
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            .then_with(|| a.id.cmp(&b.id))
    });
    low
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::NewItem;
    use chrono::{Duration, Utc};
    use stockroom_core::OwnerId;

    fn item(name: &str, sku: Option<&str>, qty: i64, supplier: Option<&str>, min: Option<i64>) -> InventoryItem {
        InventoryItem::create(
            OwnerId::new(),
            NewItem {
                name: name.to_string(),
                sku: sku.map(str::to_string),
                quantity: qty,
                unit: None,
                supplier: supplier.map(str::to_string),
                min_stock: min,
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn fixture() -> Vec<InventoryItem> {
        vec![
            item("Hex bolt", Some("HB-10"), 120, Some("Acme"), Some(50)),
            item("washer", Some("WS-01"), 4, Some("Bolt Bros"), Some(10)),
            item("Anchor", None, 0, None, Some(2)),
            item("Nut", Some("NT-5"), 33, Some("acme"), None),
        ]
    }

    fn names(page: &Page<InventoryItem>) -> Vec<&str> {
        page.items.iter().map(|i| i.name.as_str()).collect()
    }

    #[test]
    fn default_query_sorts_by_name_case_insensitively() {
        let page = ItemQuery::default().run(fixture());
        assert_eq!(names(&page), vec!["Anchor", "Hex bolt", "Nut", "washer"]);
        assert_eq!(page.total, 4);
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn search_matches_name_sku_and_supplier() {
        let query = ItemQuery {
            search: Some("BOLT".to_string()),
            ..ItemQuery::default()
        };
        // "Hex bolt" by name, "washer" by supplier "Bolt Bros".
        assert_eq!(names(&query.run(fixture())), vec!["Hex bolt", "washer"]);

        let query = ItemQuery {
            search: Some("nt-".to_string()),
            ..ItemQuery::default()
        };
        assert_eq!(names(&query.run(fixture())), vec!["Nut"]);
    }

    #[test]
    fn blank_search_matches_everything() {
        let query = ItemQuery {
            search: Some("   ".to_string()),
            ..ItemQuery::default()
        };
        assert_eq!(query.run(fixture()).total, 4);
    }

    #[test]
    fn supplier_filter_is_exact_but_case_insensitive() {
        let query = ItemQuery {
            supplier: Some("ACME".to_string()),
            ..ItemQuery::default()
        };
        assert_eq!(names(&query.run(fixture())), vec!["Hex bolt", "Nut"]);
    }

    #[test]
    fn low_stock_filter_and_listing() {
        let query = ItemQuery {
            low_stock_only: true,
            ..ItemQuery::default()
        };
        assert_eq!(names(&query.run(fixture())), vec!["Anchor", "washer"]);

        let low = low_stock(fixture());
        // washer is 6 short, Anchor is 2 short.
        let low_names: Vec<_> = low.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(low_names, vec!["washer", "Anchor"]);
    }

    #[test]
    fn quantity_sort_descending() {
        let query = ItemQuery {
            sort: SortField::Quantity,
            order: SortOrder::Desc,
            ..ItemQuery::default()
        };
        assert_eq!(names(&query.run(fixture())), vec!["Hex bolt", "Nut", "washer", "Anchor"]);
    }

    #[test]
    fn missing_sku_sorts_last_ascending() {
        let query = ItemQuery {
            sort: SortField::Sku,
            ..ItemQuery::default()
        };
        let page = query.run(fixture());
        assert_eq!(page.items.last().unwrap().name, "Anchor");
    }

    #[test]
    fn updated_at_sort_uses_timestamps() {
        let mut items = fixture();
        let base = Utc::now();
        for (i, it) in items.iter_mut().enumerate() {
            it.updated_at = base - Duration::minutes(i as i64);
        }
        sort_items(&mut items, SortField::UpdatedAt, SortOrder::Desc);
        assert_eq!(items[0].name, "Hex bolt");
    }

    #[test]
    fn pagination_windows_and_totals() {
        let query = ItemQuery {
            per_page: 3,
            page: 2,
            ..ItemQuery::default()
        };
        let page = query.run(fixture());
        assert_eq!(names(&page), vec!["washer"]);
        assert_eq!(page.total, 4);
        assert_eq!(page.total_pages, 2);

        let beyond = ItemQuery {
            page: 9,
            ..query
        };
        let page = beyond.run(fixture());
        assert!(page.items.is_empty());
        assert_eq!(page.total, 4);
        assert_eq!(page.page, 9);
    }

    #[test]
    fn per_page_is_clamped() {
        let query = ItemQuery {
            per_page: 0,
            page: 0,
            ..ItemQuery::default()
        };
        let page = query.run(fixture());
        assert_eq!(page.per_page, 1);
        assert_eq!(page.page, 1);

        let query = ItemQuery {
            per_page: 10_000,
            ..ItemQuery::default()
        };
        assert_eq!(query.run(fixture()).per_page, MAX_PER_PAGE);
    }

    #[test]
    fn empty_list_has_zero_pages() {
        let page = ItemQuery::default().run(Vec::new());
        assert_eq!(page.total, 0);
        assert_eq!(page.total_pages, 0);
    }

    #[test]
    fn query_deserializes_from_url_style_json() {
        let q: ItemQuery = serde_json::from_value(serde_json::json!({
            "q": "bolt",
            "sort": "created_at",
            "order": "desc",
            "low_stock": true
        }))
        .unwrap();
        assert_eq!(q.search.as_deref(), Some("bolt"));
        assert_eq!(q.sort, SortField::CreatedAt);
        assert_eq!(q.order, SortOrder::Desc);
        assert!(q.low_stock_only);
        assert_eq!(q.per_page, DEFAULT_PER_PAGE);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: concatenating every page yields each matched item exactly once.
            #[test]
            fn pages_partition_results(count in 0usize..60, per_page in 1usize..15) {
                let items: Vec<_> = (0..count)
                    .map(|i| item(&format!("item {i:03}"), None, i as i64, None, None))
                    .collect();
                let first = ItemQuery { per_page, ..ItemQuery::default() }.run(items.clone());

                let mut seen = Vec::new();
                for page in 1..=first.total_pages.max(1) {
                    let p = ItemQuery { per_page, page, ..ItemQuery::default() }.run(items.clone());
                    prop_assert!(p.items.len() <= per_page);
                    seen.extend(p.items.into_iter().map(|i| i.id));
                }
                prop_assert_eq!(seen.len(), count);
                seen.sort();
                seen.dedup();
                prop_assert_eq!(seen.len(), count);
            }
        }
    }
}
