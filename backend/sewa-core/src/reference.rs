// src/reference.rs
//! Reference data: office -> district -> category, and category marks.
//!
//! The store itself lives outside this crate (a database in production); the
//! engine talks to it through [`ReferenceStore`]. [`ReferenceLookup`] wraps a store
//! for the duration of one request and caches every answer, since the same
//! office/category pairs are asked for on almost every segment.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::records::Gender;

pub const OFFICES_FILE: &str = "offices.csv";
pub const DISTRICTS_FILE: &str = "districts.csv";
pub const CATEGORY_MARKS_FILE: &str = "category_marks.csv";

// --- Errors ---

#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("Failed to open reference file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed reference CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("Reference store unavailable: {0}")]
    Unavailable(String),
}

// --- Types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarksType {
    Old,
    New,
}

impl MarksType {
    /// `old`/`new`, any case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "old" => Some(MarksType::Old),
            "new" => Some(MarksType::New),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfficeRow {
    pub office: String,
    pub district: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistrictRow {
    pub district: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMarksRow {
    pub category: String,
    pub marks: Decimal,
    #[serde(rename = "type", deserialize_with = "lenient_marks_type")]
    pub marks_type: MarksType,
    /// Only "old" entries are gender specific.
    #[serde(default, deserialize_with = "lenient_gender")]
    pub gender: Option<Gender>,
}

fn lenient_marks_type<'de, D>(deserializer: D) -> Result<MarksType, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    MarksType::parse(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unknown marks type '{}'", raw)))
}

/// Blank is no gender; anything else must be a recognised spelling.
fn lenient_gender<'de, D>(deserializer: D) -> Result<Option<Gender>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => Gender::parse(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown gender '{}'", raw))),
    }
}

/// District and category an office resolves to, either possibly unknown.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OfficePlacement {
    pub district: Option<String>,
    pub category: Option<String>,
}

/// Names are matched ignoring case and runs of whitespace.
pub fn reference_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn district_for_office(&self, office: &str) -> Result<Option<String>, ReferenceError>;

    async fn category_for_district(
        &self,
        district: &str,
    ) -> Result<Option<String>, ReferenceError>;

    async fn category_marks(
        &self,
        category: &str,
        marks_type: MarksType,
        gender: Option<Gender>,
    ) -> Result<Option<Decimal>, ReferenceError>;
}

// --- In-memory store (CSV backed) ---

#[derive(Debug, Clone, Default)]
pub struct CsvReferenceStore {
    offices: HashMap<String, String>,
    districts: HashMap<String, String>,
    marks: HashMap<(String, MarksType, Option<Gender>), Decimal>,
}

fn read_rows<T, R>(reader: R) -> Result<Vec<T>, ReferenceError>
where
    T: serde::de::DeserializeOwned,
    R: Read,
{
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let rows = csv_reader
        .deserialize::<T>()
        .collect::<Result<Vec<T>, csv::Error>>()?;
    Ok(rows)
}

fn open(path: &Path) -> Result<File, ReferenceError> {
    File::open(path).map_err(|source| ReferenceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl CsvReferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `offices.csv`, `districts.csv` and `category_marks.csv` from `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, ReferenceError> {
        let store = Self::from_readers(
            open(&dir.join(OFFICES_FILE))?,
            open(&dir.join(DISTRICTS_FILE))?,
            open(&dir.join(CATEGORY_MARKS_FILE))?,
        )?;
        info!(
            "Loaded reference data from {:?}: {} offices, {} districts, {} category marks",
            dir,
            store.offices.len(),
            store.districts.len(),
            store.marks.len()
        );
        Ok(store)
    }

    pub fn from_readers<O: Read, D: Read, M: Read>(
        offices: O,
        districts: D,
        category_marks: M,
    ) -> Result<Self, ReferenceError> {
        let mut store = Self::new();
        for row in read_rows::<OfficeRow, _>(offices)? {
            store = store.with_office(&row.office, &row.district);
        }
        for row in read_rows::<DistrictRow, _>(districts)? {
            store = store.with_district(&row.district, &row.category);
        }
        for row in read_rows::<CategoryMarksRow, _>(category_marks)? {
            store = store.with_category_marks(&row.category, row.marks_type, row.gender, row.marks);
        }
        Ok(store)
    }

    pub fn with_office(mut self, office: &str, district: &str) -> Self {
        self.offices
            .insert(reference_key(office), district.trim().to_string());
        self
    }

    pub fn with_district(mut self, district: &str, category: &str) -> Self {
        self.districts
            .insert(reference_key(district), category.trim().to_string());
        self
    }

    pub fn with_category_marks(
        mut self,
        category: &str,
        marks_type: MarksType,
        gender: Option<Gender>,
        marks: Decimal,
    ) -> Self {
        // "new" marks are never gender specific.
        let gender = match marks_type {
            MarksType::Old => gender,
            MarksType::New => None,
        };
        self.marks
            .insert((reference_key(category), marks_type, gender), marks);
        self
    }
}

#[async_trait]
impl ReferenceStore for CsvReferenceStore {
    async fn district_for_office(&self, office: &str) -> Result<Option<String>, ReferenceError> {
        Ok(self.offices.get(&reference_key(office)).cloned())
    }

    async fn category_for_district(
        &self,
        district: &str,
    ) -> Result<Option<String>, ReferenceError> {
        Ok(self.districts.get(&reference_key(district)).cloned())
    }

    async fn category_marks(
        &self,
        category: &str,
        marks_type: MarksType,
        gender: Option<Gender>,
    ) -> Result<Option<Decimal>, ReferenceError> {
        Ok(self
            .marks
            .get(&(reference_key(category), marks_type, gender))
            .copied())
    }
}

// --- Per-request cached lookup ---

type MarksKey = (String, MarksType, Option<Gender>);

/// Request-scoped view over a [`ReferenceStore`].
///
/// Store failures are logged and treated as "not found"; each call site decides
/// what a missing value is worth.
#[derive(Clone)]
pub struct ReferenceLookup {
    store: Arc<dyn ReferenceStore>,
    districts: Arc<Mutex<HashMap<String, Option<String>>>>,
    categories: Arc<Mutex<HashMap<String, Option<String>>>>,
    marks: Arc<Mutex<HashMap<MarksKey, Option<Decimal>>>>,
}

impl ReferenceLookup {
    pub fn new(store: Arc<dyn ReferenceStore>) -> Self {
        Self {
            store,
            districts: Arc::new(Mutex::new(HashMap::new())),
            categories: Arc::new(Mutex::new(HashMap::new())),
            marks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn cached<K, V>(cache: &Mutex<HashMap<K, V>>, key: &K) -> Option<V>
    where
        K: std::hash::Hash + Eq,
        V: Clone,
    {
        match cache.lock() {
            Ok(guard) => guard.get(key).cloned(),
            Err(poisoned) => poisoned.into_inner().get(key).cloned(),
        }
    }

    fn remember<K, V>(cache: &Mutex<HashMap<K, V>>, key: K, value: V) -> V
    where
        K: std::hash::Hash + Eq,
        V: Clone,
    {
        let mut guard = match cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Another task may have filled it while we were awaiting the store.
        guard.entry(key).or_insert(value).clone()
    }

    pub async fn district_for_office(&self, office: &str) -> Option<String> {
        let key = reference_key(office);
        if key.is_empty() {
            return None;
        }
        if let Some(hit) = Self::cached(&self.districts, &key) {
            debug!("Cache HIT for office '{}'", office);
            return hit;
        }
        debug!("Cache MISS for office '{}'", office);
        let value = match self.store.district_for_office(office).await {
            Ok(v) => v,
            Err(e) => {
                warn!("District lookup for office '{}' failed: {}", office, e);
                return None;
            }
        };
        if value.is_none() {
            warn!("Office '{}' has no district", office);
        }
        Self::remember(&self.districts, key, value)
    }

    pub async fn category_for_district(&self, district: &str) -> Option<String> {
        let key = reference_key(district);
        if key.is_empty() {
            return None;
        }
        if let Some(hit) = Self::cached(&self.categories, &key) {
            return hit;
        }
        let value = match self.store.category_for_district(district).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Category lookup for district '{}' failed: {}", district, e);
                return None;
            }
        };
        if value.is_none() {
            warn!("District '{}' has no category", district);
        }
        Self::remember(&self.categories, key, value)
    }

    /// Office -> district -> category.
    pub async fn placement_for_office(&self, office: &str) -> OfficePlacement {
        let district = self.district_for_office(office).await;
        let category = match district.as_deref() {
            Some(d) => self.category_for_district(d).await,
            None => None,
        };
        OfficePlacement { district, category }
    }

    pub async fn category_for_office(&self, office: &str) -> Option<String> {
        self.placement_for_office(office).await.category
    }

    async fn category_marks(
        &self,
        category: &str,
        marks_type: MarksType,
        gender: Option<Gender>,
    ) -> Option<Decimal> {
        let key = (reference_key(category), marks_type, gender);
        if let Some(hit) = Self::cached(&self.marks, &key) {
            return hit;
        }
        let value = match self.store.category_marks(category, marks_type, gender).await {
            Ok(v) => v,
            Err(e) => {
                warn!(
                    "Marks lookup for category '{}' ({:?}, {:?}) failed: {}",
                    category, marks_type, gender, e
                );
                return None;
            }
        };
        Self::remember(&self.marks, key, value)
    }

    /// Old-system annual marks; a missing female entry falls back to the male one.
    pub async fn old_marks(&self, category: &str, gender: Gender) -> Option<Decimal> {
        let direct = self
            .category_marks(category, MarksType::Old, Some(gender))
            .await;
        match (direct, gender) {
            (Some(marks), _) => Some(marks),
            (None, Gender::Female) => {
                debug!(
                    "No female old-system marks for '{}', using the male entry",
                    category
                );
                self.category_marks(category, MarksType::Old, Some(Gender::Male))
                    .await
            }
            (None, Gender::Male) => None,
        }
    }

    /// New-system annual marks (not gender specific).
    pub async fn new_marks(&self, category: &str) -> Option<Decimal> {
        self.category_marks(category, MarksType::New, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const OFFICES: &str = "office,district\nDistrict Office Humla, Humla\nKathmandu Office,Kathmandu\n";
    const DISTRICTS: &str = "district,category\nHumla,A\nKathmandu,D\n";
    const MARKS: &str = "category,marks,type,gender\n\
                         A,3.5,old,male\n\
                         A,3.25,old,female\n\
                         D,1.25,old,male\n\
                         A,3.0,new,\n\
                         D,1.0,new,\n";

    fn store() -> CsvReferenceStore {
        CsvReferenceStore::from_readers(OFFICES.as_bytes(), DISTRICTS.as_bytes(), MARKS.as_bytes())
            .unwrap()
    }

    #[tokio::test]
    async fn office_resolves_to_category_through_district() {
        let lookup = ReferenceLookup::new(Arc::new(store()));
        let placement = lookup.placement_for_office("district office  HUMLA").await;
        assert_eq!(placement.district.as_deref(), Some("Humla"));
        assert_eq!(placement.category.as_deref(), Some("A"));
        assert_eq!(lookup.category_for_office("Nowhere").await, None);
        assert_eq!(lookup.category_for_office("").await, None);
    }

    #[tokio::test]
    async fn female_old_marks_fall_back_to_male() {
        let lookup = ReferenceLookup::new(Arc::new(store()));
        assert_eq!(lookup.old_marks("A", Gender::Female).await, Some(dec!(3.25)));
        assert_eq!(lookup.old_marks("D", Gender::Female).await, Some(dec!(1.25)));
        assert_eq!(lookup.old_marks("Z", Gender::Male).await, None);
        assert_eq!(lookup.new_marks("a").await, Some(dec!(3.0)));
    }

    struct CountingStore {
        inner: CsvReferenceStore,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReferenceStore for CountingStore {
        async fn district_for_office(
            &self,
            office: &str,
        ) -> Result<Option<String>, ReferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.district_for_office(office).await
        }

        async fn category_for_district(
            &self,
            district: &str,
        ) -> Result<Option<String>, ReferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.category_for_district(district).await
        }

        async fn category_marks(
            &self,
            category: &str,
            marks_type: MarksType,
            gender: Option<Gender>,
        ) -> Result<Option<Decimal>, ReferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ReferenceError::Unavailable(format!(
                "{} {:?} {:?}",
                category, marks_type, gender
            )))
        }
    }

    #[tokio::test]
    async fn repeated_lookups_hit_the_cache_and_errors_degrade() {
        let counting = Arc::new(CountingStore {
            inner: store(),
            calls: AtomicUsize::new(0),
        });
        let lookup = ReferenceLookup::new(counting.clone());
        for _ in 0..5 {
            assert_eq!(
                lookup.category_for_office("Kathmandu Office").await.as_deref(),
                Some("D")
            );
        }
        assert_eq!(counting.calls.load(Ordering::SeqCst), 2);

        assert_eq!(lookup.new_marks("D").await, None);
    }

    #[test]
    fn malformed_marks_csv_is_an_error() {
        let bad = "category,marks,type,gender\nA,lots,old,male\n";
        let result =
            CsvReferenceStore::from_readers(OFFICES.as_bytes(), DISTRICTS.as_bytes(), bad.as_bytes());
        assert!(matches!(result, Err(ReferenceError::Csv(_))));
    }

    #[tokio::test]
    async fn marks_type_and_gender_cells_ignore_case() {
        let marks = "category,marks,type,gender
                     A,3.5,Old,Male
                     A,3.25,OLD,F
                     A,3.0,NEW,
";
        let store =
            CsvReferenceStore::from_readers(OFFICES.as_bytes(), DISTRICTS.as_bytes(), marks.as_bytes())
                .unwrap();
        let lookup = ReferenceLookup::new(Arc::new(store));
        assert_eq!(lookup.old_marks("A", Gender::Male).await, Some(dec!(3.5)));
        assert_eq!(lookup.old_marks("A", Gender::Female).await, Some(dec!(3.25)));
        assert_eq!(lookup.new_marks("A").await, Some(dec!(3.0)));
    }

    #[test]
    fn unknown_marks_type_or_gender_is_an_error() {
        for bad in [
            "category,marks,type,gender
A,3.5,older,male
",
            "category,marks,type,gender
A,3.5,old,other
",
        ] {
            let result = CsvReferenceStore::from_readers(
                OFFICES.as_bytes(),
                DISTRICTS.as_bytes(),
                bad.as_bytes(),
            );
            assert!(matches!(result, Err(ReferenceError::Csv(_))));
        }
    }
}
