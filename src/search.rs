//! Business search pipeline: slug resolution, filter assembly, pagination.
//!
//! The pipeline runs in three read-only steps:
//! 1. resolve human-readable slugs (city, neighborhood, category,
//!    subcategory) to internal ids; an unresolvable scoping slug
//!    short-circuits the search with an empty result and a message instead
//!    of silently widening the filter;
//! 2. assemble a pure [`BusinessFilter`] from the resolved ids and the
//!    optional case-insensitive name substring;
//! 3. count, slice (or randomly sample) and populate one page of results.

use rand::seq::index::sample;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::models::{Business, BusinessView};
use crate::storage::Store;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_PER_PAGE: u64 = 9;

/// Raw query parameters of `GET /businesses/search`.
///
/// `page`/`perPage` stay strings here so malformed values coerce to the
/// defaults instead of rejecting the request.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct SearchParams {
    pub name: Option<String>,
    pub city: Option<String>,
    pub neighborhood: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub page: Option<String>,
    #[serde(rename = "perPage")]
    pub per_page: Option<String>,
    pub random: Option<String>,
}

impl SearchParams {
    pub fn page(&self) -> u64 {
        coerce_positive(self.page.as_deref(), DEFAULT_PAGE)
    }

    pub fn per_page(&self) -> u64 {
        coerce_positive(self.per_page.as_deref(), DEFAULT_PER_PAGE)
    }

    pub fn random(&self) -> bool {
        matches!(
            self.random.as_deref().map(str::trim),
            Some("true") | Some("1")
        )
    }
}

/// Coerce a raw page/perPage value: non-numeric, zero and negative all fall
/// back to the default.
fn coerce_positive(raw: Option<&str>, default: u64) -> u64 {
    match raw.and_then(|s| s.trim().parse::<i64>().ok()) {
        Some(n) if n > 0 => n as u64,
        _ => default,
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Native filter over businesses, built once per request from resolved ids.
/// Absent parameters are absent from the filter entirely.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BusinessFilter {
    /// Lowercased substring matched against the business name.
    pub name: Option<String>,
    pub city: Option<String>,
    pub neighborhood: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
}

impl BusinessFilter {
    pub fn matches(&self, business: &Business) -> bool {
        if let Some(name) = &self.name {
            if !business.name.to_lowercase().contains(name.as_str()) {
                return false;
            }
        }
        if let Some(city) = &self.city {
            if business.address.city != *city {
                return false;
            }
        }
        if let Some(neighborhood) = &self.neighborhood {
            if business.address.neighborhood != *neighborhood {
                return false;
            }
        }
        // Membership semantics over the reference arrays
        if let Some(category) = &self.category {
            if !business.categories.iter().any(|id| id == category) {
                return false;
            }
        }
        if let Some(subcategory) = &self.subcategory {
            if !business.sub_categories.iter().any(|id| id == subcategory) {
                return false;
            }
        }
        true
    }
}

/// Outcome of slug resolution: a usable filter, or the message explaining
/// which scoping slug failed to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Filter(BusinessFilter),
    Miss(&'static str),
}

pub fn resolve_filter(store: &Store, params: &SearchParams) -> Result<Resolved, StoreError> {
    let mut filter = BusinessFilter::default();

    if let Some(name) = non_empty(&params.name) {
        filter.name = Some(name.to_lowercase());
    }

    let mut city_id = None;
    if let Some(slug) = non_empty(&params.city) {
        match store.city_by_slug(slug)? {
            Some(city) => {
                city_id = Some(city.id.clone());
                filter.city = Some(city.id);
            }
            None => return Ok(Resolved::Miss("Cidade não encontrada")),
        }
    }

    if let Some(slug) = non_empty(&params.neighborhood) {
        match store.neighborhood_by_slug(slug, city_id.as_deref())? {
            Some(neighborhood) => filter.neighborhood = Some(neighborhood.id),
            None if city_id.is_some() => {
                return Ok(Resolved::Miss("Bairro não encontrado nesta cidade"))
            }
            None => return Ok(Resolved::Miss("Bairro não encontrado")),
        }
    }

    if let Some(slug) = non_empty(&params.category) {
        match store.category_by_slug(slug)? {
            Some(category) => filter.category = Some(category.id),
            None => return Ok(Resolved::Miss("Categoria não encontrada")),
        }
    }

    if let Some(slug) = non_empty(&params.subcategory) {
        match store.sub_category_by_slug(slug)? {
            Some(sub) => filter.subcategory = Some(sub.id),
            None => return Ok(Resolved::Miss("Subcategoria não encontrada")),
        }
    }

    Ok(Resolved::Filter(filter))
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    #[serde(rename = "perPage")]
    pub per_page: u64,
    pub total: u64,
    #[serde(rename = "totalPages")]
    pub total_pages: u64,
}

/// Pagination metadata. `total` is the full filtered count, independent of
/// the page slice.
pub fn paginate(total: u64, page: u64, per_page: u64) -> Pagination {
    Pagination {
        page,
        per_page,
        total,
        total_pages: total.div_ceil(per_page),
    }
}

#[derive(Serialize, Debug)]
pub struct SearchPage {
    pub results: Vec<BusinessView>,
    pub pagination: Pagination,
}

#[derive(Debug)]
pub enum SearchOutcome {
    Page(SearchPage),
    /// A scoping slug failed to resolve; the HTTP layer answers 200 with an
    /// empty data array and this message.
    Miss(&'static str),
}

/// Run the full pipeline: resolve, filter, count, slice/sample, populate.
///
/// Each business is visited exactly once, so a record matching several of
/// its categories still lands on the page a single time, with the relation
/// arrays populated in full.
pub fn run_search(store: &Store, params: &SearchParams) -> Result<SearchOutcome, StoreError> {
    let filter = match resolve_filter(store, params)? {
        Resolved::Filter(filter) => filter,
        Resolved::Miss(message) => return Ok(SearchOutcome::Miss(message)),
    };

    let page = params.page();
    let per_page = params.per_page();

    let matches: Vec<Business> = store
        .businesses()?
        .into_iter()
        .filter(|b| filter.matches(b))
        .collect();
    let total = matches.len() as u64;

    let slice: Vec<&Business> = if params.random() {
        // Uniform sample, not a shuffle: repeated calls may differ
        let amount = per_page.min(total) as usize;
        let mut rng = rand::thread_rng();
        sample(&mut rng, matches.len(), amount)
            .into_iter()
            .map(|i| &matches[i])
            .collect()
    } else {
        // Saturating math: absurdly large page/perPage values are valid
        // positives after coercion and must land on an empty page, not wrap
        let offset = page.saturating_sub(1).saturating_mul(per_page);
        matches
            .iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(per_page).unwrap_or(usize::MAX))
            .collect()
    };

    let mut results = Vec::with_capacity(slice.len());
    for business in slice {
        results.push(store.populate(business)?);
    }

    Ok(SearchOutcome::Page(SearchPage {
        results,
        pagination: paginate(total, page, per_page),
    }))
}
