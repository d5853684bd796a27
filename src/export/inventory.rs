//! Inventory analytics
//!
//! Figures computed from the normalized table itself, for reports whose schema
//! names its inventory columns: units by equipment age, how units spread over
//! locations, and the items at or above a unit-cost threshold. Everything is
//! derived from the table and the report date, so the same inputs always give
//! the same figures.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::catalog::InventoryColumns;
use crate::models::{NormalizedRow, NormalizedTable, Value};

const DAYS_PER_YEAR: f64 = 365.25;

/// Age of an item on the report date
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeBand {
    New,
    Recent,
    Mature,
    Old,
    /// No acquisition date
    Unknown,
}

impl AgeBand {
    /// Band for an item acquired on `acquired`, seen on `on`
    ///
    /// Dates after `on` count as new.
    pub fn of(acquired: Option<NaiveDate>, on: NaiveDate) -> Self {
        let Some(acquired) = acquired else {
            return AgeBand::Unknown;
        };
        let years = (on - acquired).num_days() as f64 / DAYS_PER_YEAR;
        if years < 1.0 {
            AgeBand::New
        } else if years < 3.0 {
            AgeBand::Recent
        } else if years < 5.0 {
            AgeBand::Mature
        } else {
            AgeBand::Old
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgeBand::New => "New (< 1 year)",
            AgeBand::Recent => "Recent (1-3 years)",
            AgeBand::Mature => "Mature (3-5 years)",
            AgeBand::Old => "Old (> 5 years)",
            AgeBand::Unknown => "Unknown",
        }
    }
}

/// How units spread over locations and items
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Utilization {
    pub locations: usize,
    pub average_per_location: f64,
    /// Location holding the most units; ties go to the first name in order
    pub busiest_location: String,
    pub busiest_units: f64,
    pub quietest_location: String,
    pub quietest_units: f64,
    /// Item on the most records; ties go to the first name in order
    pub most_common_item: String,
    /// Distinct items per record, between 0 and 1
    pub diversity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighValueItem {
    pub item: String,
    pub location: String,
    pub unit_cost: f64,
    pub quantity: f64,
}

/// Everything the inventory sections show
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryAnalytics {
    /// Units per age band; bands without units are left out
    pub units_by_age: BTreeMap<AgeBand, f64>,
    /// `None` for a table without rows
    pub utilization: Option<Utilization>,
    /// Most expensive first
    pub high_value: Vec<HighValueItem>,
}

impl InventoryAnalytics {
    pub fn compute(
        table: &NormalizedTable,
        columns: &InventoryColumns,
        on: NaiveDate,
        high_value_threshold: f64,
    ) -> Self {
        let text = |row: &NormalizedRow, column: &str| match table.value(row, column) {
            Value::Null => "Unknown".to_string(),
            value => value.to_string(),
        };
        let number = |row: &NormalizedRow, column: &str| table.value(row, column).as_f64();

        let mut units_by_age = BTreeMap::new();
        let mut units_by_location: BTreeMap<String, f64> = BTreeMap::new();
        let mut records_by_item: BTreeMap<String, usize> = BTreeMap::new();
        let mut high_value = Vec::new();

        for row in &table.rows {
            let units = number(row, &columns.quantity).unwrap_or(0.0);
            let band = AgeBand::of(table.value(row, &columns.acquired).as_date(), on);
            *units_by_age.entry(band).or_insert(0.0) += units;

            let location = text(row, &columns.location);
            *units_by_location.entry(location.clone()).or_insert(0.0) += units;
            let item = text(row, &columns.item);
            *records_by_item.entry(item.clone()).or_insert(0) += 1;

            if let Some(unit_cost) = number(row, &columns.unit_cost)
                && unit_cost >= high_value_threshold
            {
                high_value.push(HighValueItem {
                    item,
                    location,
                    unit_cost,
                    quantity: units,
                });
            }
        }

        units_by_age.retain(|_, units| *units > 0.0);
        high_value.sort_by(|a, b| {
            b.unit_cost
                .total_cmp(&a.unit_cost)
                .then_with(|| a.item.cmp(&b.item))
                .then_with(|| a.location.cmp(&b.location))
        });

        Self {
            units_by_age,
            utilization: utilization(&units_by_location, &records_by_item, table.row_count()),
            high_value,
        }
    }
}

fn utilization(
    units_by_location: &BTreeMap<String, f64>,
    records_by_item: &BTreeMap<String, usize>,
    records: usize,
) -> Option<Utilization> {
    if records == 0 {
        return None;
    }
    let mut locations = units_by_location.iter();
    let (first, &first_units) = locations.next()?;
    let (mut busiest, mut quietest) = ((first, first_units), (first, first_units));
    for (location, &units) in locations {
        if units > busiest.1 {
            busiest = (location, units);
        }
        if units < quietest.1 {
            quietest = (location, units);
        }
    }

    let mut most_common = records_by_item.iter().next()?;
    for entry in records_by_item {
        if entry.1 > most_common.1 {
            most_common = entry;
        }
    }

    let total: f64 = units_by_location.values().sum();
    Some(Utilization {
        locations: units_by_location.len(),
        average_per_location: total / units_by_location.len() as f64,
        busiest_location: busiest.0.clone(),
        busiest_units: busiest.1,
        quietest_location: quietest.0.clone(),
        quietest_units: quietest.1,
        most_common_item: most_common.0.clone(),
        diversity: records_by_item.len() as f64 / records as f64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn columns() -> InventoryColumns {
        InventoryColumns {
            item: "device_name".to_string(),
            quantity: "quantity".to_string(),
            location: "location".to_string(),
            acquired: "procurement_date".to_string(),
            unit_cost: "cost".to_string(),
        }
    }

    fn table(rows: &[(&str, i64, &str, Option<NaiveDate>, f64)]) -> NormalizedTable {
        NormalizedTable {
            report_type: "campus_assets".to_string(),
            columns: ["device_name", "quantity", "location", "procurement_date", "cost"]
                .map(str::to_string)
                .to_vec(),
            rows: rows
                .iter()
                .enumerate()
                .map(|(i, (item, qty, location, acquired, cost))| NormalizedRow {
                    source_index: i,
                    values: vec![
                        Value::Text(item.to_string()),
                        Value::Integer(*qty),
                        Value::Text(location.to_string()),
                        acquired.map(Value::Date).unwrap_or(Value::Null),
                        Value::Number(*cost),
                    ],
                    merge_count: 1,
                })
                .collect(),
            base_currency: "INR".to_string(),
            rates_version: "test".to_string(),
        }
    }

    #[test]
    fn test_age_band_edges() {
        let on = date(2024, 5, 1);
        assert_eq!(AgeBand::of(Some(date(2024, 6, 1)), on), AgeBand::New);
        assert_eq!(AgeBand::of(Some(date(2023, 6, 1)), on), AgeBand::New);
        assert_eq!(AgeBand::of(Some(date(2023, 4, 1)), on), AgeBand::Recent);
        assert_eq!(AgeBand::of(Some(date(2020, 6, 1)), on), AgeBand::Mature);
        assert_eq!(AgeBand::of(Some(date(2019, 4, 1)), on), AgeBand::Old);
        assert_eq!(AgeBand::of(None, on), AgeBand::Unknown);
    }

    #[test]
    fn test_units_by_age() {
        let table = table(&[
            ("Laptop", 4, "Lab 1", Some(date(2024, 1, 10)), 60_000.0),
            ("Mouse", 10, "Lab 1", Some(date(2023, 1, 10)), 500.0),
            ("Projector", 1, "Hall", Some(date(2017, 8, 1)), 45_000.0),
            ("Chair", 30, "Hall", None, 1_200.0),
        ]);
        let analytics = InventoryAnalytics::compute(&table, &columns(), date(2024, 5, 1), 100_000.0);

        let bands: Vec<(AgeBand, f64)> = analytics.units_by_age.into_iter().collect();
        assert_eq!(
            bands,
            vec![
                (AgeBand::New, 4.0),
                (AgeBand::Recent, 10.0),
                (AgeBand::Old, 1.0),
                (AgeBand::Unknown, 30.0),
            ]
        );
    }

    #[test]
    fn test_utilization() {
        let table = table(&[
            ("Laptop", 4, "Lab 1", None, 60_000.0),
            ("Laptop", 2, "Lab 2", None, 60_000.0),
            ("Mouse", 10, "Lab 1", None, 500.0),
            ("Chair", 2, "Hall", None, 1_200.0),
        ]);
        let utilization = InventoryAnalytics::compute(&table, &columns(), date(2024, 5, 1), 100_000.0)
            .utilization
            .unwrap();

        assert_eq!(utilization.locations, 3);
        assert_eq!(utilization.average_per_location, 6.0);
        assert_eq!(utilization.busiest_location, "Lab 1");
        assert_eq!(utilization.busiest_units, 14.0);
        // Hall and Lab 2 tie; Hall comes first
        assert_eq!(utilization.quietest_location, "Hall");
        assert_eq!(utilization.quietest_units, 2.0);
        assert_eq!(utilization.most_common_item, "Laptop");
        assert_eq!(utilization.diversity, 0.75);
    }

    #[test]
    fn test_high_value_items_at_or_above_threshold() {
        let table = table(&[
            ("Switch", 2, "Server Room", None, 100_000.0),
            ("Laptop", 4, "Lab 1", None, 99_999.99),
            ("Server", 1, "Server Room", None, 250_000.0),
        ]);
        let analytics = InventoryAnalytics::compute(&table, &columns(), date(2024, 5, 1), 100_000.0);

        let items: Vec<&str> = analytics.high_value.iter().map(|i| i.item.as_str()).collect();
        assert_eq!(items, vec!["Server", "Switch"]);
        assert_eq!(analytics.high_value[1].quantity, 2.0);
    }

    #[test]
    fn test_empty_table() {
        let analytics = InventoryAnalytics::compute(&table(&[]), &columns(), date(2024, 5, 1), 1.0);
        assert!(analytics.units_by_age.is_empty());
        assert!(analytics.utilization.is_none());
        assert!(analytics.high_value.is_empty());
    }
}
