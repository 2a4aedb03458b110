//! Sled-backed document store for the directory.
//!
//! One tree per entity, records serialized as JSON (schema-flexible storage
//! in Sled). Slug and email uniqueness is enforced through dedicated index
//! trees (slug → id) with `compare_and_swap`, so a duplicate write fails at
//! the store layer instead of racing a read-then-write check.
//!
//! Deletion is a lifecycle toggle: records flip to `Status::Inactive` and
//! public read paths filter them out.

use std::collections::HashMap;
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};
use sled::{Db, Tree};

use crate::error::StoreError;
use crate::models::{
    AddressView, Business, BusinessView, Category, City, Favorite, Neighborhood, PopularCity,
    PublicUser, Status, SubCategory, User,
};

#[allow(dead_code)] // db kept for future ops like flush/close on Sled
#[derive(Clone)] // Clone for sharing across handlers (Sled internals cheap to clone)
pub struct Store {
    db: Db,
    cities: Tree,
    neighborhoods: Tree,
    categories: Tree,
    sub_categories: Tree,
    businesses: Tree,
    users: Tree,
    favorites: Tree,
    // Unique indexes: key → entity id
    city_slugs: Tree,
    business_slugs: Tree,
    user_emails: Tree,
}

fn put<T: Serialize>(tree: &Tree, key: &str, value: &T) -> Result<(), StoreError> {
    tree.insert(key.as_bytes(), serde_json::to_vec(value)?)?;
    Ok(())
}

fn get<T: DeserializeOwned>(tree: &Tree, key: &str) -> Result<Option<T>, StoreError> {
    match tree.get(key.as_bytes())? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

fn scan<T: DeserializeOwned>(tree: &Tree) -> Result<Vec<T>, StoreError> {
    let mut records = Vec::new();
    for item in tree.iter() {
        let (_, value) = item?;
        records.push(serde_json::from_slice(&value)?);
    }
    Ok(records)
}

/// Reserve a unique index entry, failing with `Duplicate` when taken.
fn reserve(index: &Tree, key: &str, id: &str, taken: &str) -> Result<(), StoreError> {
    match index.compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(id.as_bytes()))? {
        Ok(()) => Ok(()),
        Err(_) => Err(StoreError::Duplicate(taken.to_string())),
    }
}

impl Store {
    /// Open or create the Sled database at the given path and its trees.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self {
            cities: db.open_tree("cities")?,
            neighborhoods: db.open_tree("neighborhoods")?,
            categories: db.open_tree("categories")?,
            sub_categories: db.open_tree("sub_categories")?,
            businesses: db.open_tree("businesses")?,
            users: db.open_tree("users")?,
            favorites: db.open_tree("favorites")?,
            city_slugs: db.open_tree("city_slugs")?,
            business_slugs: db.open_tree("business_slugs")?,
            user_emails: db.open_tree("user_emails")?,
            db,
        })
    }

    // --- Cities ---

    pub fn insert_city(&self, city: &City) -> Result<(), StoreError> {
        reserve(&self.city_slugs, &city.slug, &city.id, "Cidade já existe")?;
        put(&self.cities, &city.id, city)
    }

    pub fn city(&self, id: &str) -> Result<Option<City>, StoreError> {
        get(&self.cities, id)
    }

    pub fn city_by_slug(&self, slug: &str) -> Result<Option<City>, StoreError> {
        let Some(id) = self.city_slugs.get(slug.as_bytes())? else {
            return Ok(None);
        };
        let id = String::from_utf8_lossy(&id).to_string();
        Ok(self.city(&id)?.filter(|c| c.status.is_active()))
    }

    pub fn cities(&self) -> Result<Vec<City>, StoreError> {
        let mut cities: Vec<City> = scan(&self.cities)?;
        cities.retain(|c| c.status.is_active());
        cities.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(cities)
    }

    /// Update a city, re-indexing its slug when the name changed.
    pub fn update_city(&self, city: &City) -> Result<(), StoreError> {
        if let Some(old) = self.city(&city.id)? {
            if old.slug != city.slug {
                reserve(&self.city_slugs, &city.slug, &city.id, "Cidade já existe")?;
                self.city_slugs.remove(old.slug.as_bytes())?;
            }
        }
        put(&self.cities, &city.id, city)
    }

    pub fn deactivate_city(&self, id: &str) -> Result<Option<City>, StoreError> {
        let Some(mut city) = self.city(id)? else {
            return Ok(None);
        };
        city.status = Status::Inactive;
        put(&self.cities, id, &city)?;
        Ok(Some(city))
    }

    // --- Neighborhoods ---

    pub fn put_neighborhood(&self, neighborhood: &Neighborhood) -> Result<(), StoreError> {
        put(&self.neighborhoods, &neighborhood.id, neighborhood)
    }

    pub fn neighborhood(&self, id: &str) -> Result<Option<Neighborhood>, StoreError> {
        get(&self.neighborhoods, id)
    }

    pub fn neighborhoods(
        &self,
        city: Option<&str>,
        status: Option<Status>,
    ) -> Result<Vec<Neighborhood>, StoreError> {
        let mut records: Vec<Neighborhood> = scan(&self.neighborhoods)?;
        if let Some(city) = city {
            records.retain(|n| n.city == city);
        }
        if let Some(status) = status {
            records.retain(|n| n.status == status);
        }
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    /// First active neighborhood matching the slug, optionally scoped to a
    /// city. Scoping is what keeps "centro" in one city from matching in
    /// another during search resolution.
    pub fn neighborhood_by_slug(
        &self,
        slug: &str,
        city: Option<&str>,
    ) -> Result<Option<Neighborhood>, StoreError> {
        let records: Vec<Neighborhood> = scan(&self.neighborhoods)?;
        Ok(records.into_iter().find(|n| {
            n.status.is_active()
                && n.slug == slug
                && city.map(|city| n.city == city).unwrap_or(true)
        }))
    }

    /// Case-insensitive (name, city) lookup across both lifecycle states,
    /// used by the create path's duplicate/reactivation check.
    pub fn find_neighborhood_by_name(
        &self,
        name: &str,
        city: &str,
    ) -> Result<Option<Neighborhood>, StoreError> {
        let needle = name.trim().to_lowercase();
        let records: Vec<Neighborhood> = scan(&self.neighborhoods)?;
        Ok(records
            .into_iter()
            .find(|n| n.city == city && n.name.to_lowercase() == needle))
    }

    pub fn deactivate_neighborhood(&self, id: &str) -> Result<Option<Neighborhood>, StoreError> {
        let Some(mut neighborhood) = self.neighborhood(id)? else {
            return Ok(None);
        };
        neighborhood.status = Status::Inactive;
        put(&self.neighborhoods, id, &neighborhood)?;
        Ok(Some(neighborhood))
    }

    // --- Categories ---

    pub fn put_category(&self, category: &Category) -> Result<(), StoreError> {
        put(&self.categories, &category.id, category)
    }

    pub fn category(&self, id: &str) -> Result<Option<Category>, StoreError> {
        get(&self.categories, id)
    }

    pub fn categories(&self) -> Result<Vec<Category>, StoreError> {
        let mut records: Vec<Category> = scan(&self.categories)?;
        records.retain(|c| c.status.is_active());
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    pub fn category_by_slug(&self, slug: &str) -> Result<Option<Category>, StoreError> {
        let records: Vec<Category> = scan(&self.categories)?;
        Ok(records
            .into_iter()
            .find(|c| c.status.is_active() && c.slug == slug))
    }

    pub fn find_category_by_name(&self, name: &str) -> Result<Option<Category>, StoreError> {
        let needle = name.trim().to_lowercase();
        let records: Vec<Category> = scan(&self.categories)?;
        Ok(records.into_iter().find(|c| c.name.to_lowercase() == needle))
    }

    pub fn deactivate_category(&self, id: &str) -> Result<Option<Category>, StoreError> {
        let Some(mut category) = self.category(id)? else {
            return Ok(None);
        };
        category.status = Status::Inactive;
        put(&self.categories, id, &category)?;
        Ok(Some(category))
    }

    pub fn count_active_sub_categories(&self, category: &str) -> Result<u64, StoreError> {
        let records: Vec<SubCategory> = scan(&self.sub_categories)?;
        Ok(records
            .iter()
            .filter(|s| s.category == category && s.status.is_active())
            .count() as u64)
    }

    // --- SubCategories ---

    pub fn put_sub_category(&self, sub: &SubCategory) -> Result<(), StoreError> {
        put(&self.sub_categories, &sub.id, sub)
    }

    pub fn sub_category(&self, id: &str) -> Result<Option<SubCategory>, StoreError> {
        get(&self.sub_categories, id)
    }

    pub fn sub_categories(
        &self,
        category: Option<&str>,
        status: Option<Status>,
    ) -> Result<Vec<SubCategory>, StoreError> {
        let mut records: Vec<SubCategory> = scan(&self.sub_categories)?;
        if let Some(category) = category {
            records.retain(|s| s.category == category);
        }
        if let Some(status) = status {
            records.retain(|s| s.status == status);
        }
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    pub fn sub_category_by_slug(&self, slug: &str) -> Result<Option<SubCategory>, StoreError> {
        let records: Vec<SubCategory> = scan(&self.sub_categories)?;
        Ok(records
            .into_iter()
            .find(|s| s.status.is_active() && s.slug == slug))
    }

    pub fn find_sub_category_by_name(
        &self,
        name: &str,
        category: &str,
    ) -> Result<Option<SubCategory>, StoreError> {
        let needle = name.trim().to_lowercase();
        let records: Vec<SubCategory> = scan(&self.sub_categories)?;
        Ok(records
            .into_iter()
            .find(|s| s.category == category && s.name.to_lowercase() == needle))
    }

    pub fn deactivate_sub_category(&self, id: &str) -> Result<Option<SubCategory>, StoreError> {
        let Some(mut sub) = self.sub_category(id)? else {
            return Ok(None);
        };
        sub.status = Status::Inactive;
        put(&self.sub_categories, id, &sub)?;
        Ok(Some(sub))
    }

    // --- Businesses ---

    pub fn insert_business(&self, business: &Business) -> Result<(), StoreError> {
        reserve(
            &self.business_slugs,
            &business.slug,
            &business.id,
            "Estabelecimento já existe",
        )?;
        put(&self.businesses, &business.id, business)
    }

    pub fn business(&self, id: &str) -> Result<Option<Business>, StoreError> {
        get(&self.businesses, id)
    }

    pub fn business_by_slug(&self, slug: &str) -> Result<Option<Business>, StoreError> {
        let Some(id) = self.business_slugs.get(slug.as_bytes())? else {
            return Ok(None);
        };
        let id = String::from_utf8_lossy(&id).to_string();
        Ok(self.business(&id)?.filter(|b| b.status.is_active()))
    }

    /// Active businesses in creation order (the default search order).
    pub fn businesses(&self) -> Result<Vec<Business>, StoreError> {
        let mut records: Vec<Business> = scan(&self.businesses)?;
        records.retain(|b| b.status.is_active());
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }

    pub fn update_business(&self, business: &Business) -> Result<(), StoreError> {
        if let Some(old) = self.business(&business.id)? {
            if old.slug != business.slug {
                reserve(
                    &self.business_slugs,
                    &business.slug,
                    &business.id,
                    "Estabelecimento já existe",
                )?;
                self.business_slugs.remove(old.slug.as_bytes())?;
            }
        }
        put(&self.businesses, &business.id, business)
    }

    pub fn deactivate_business(&self, id: &str) -> Result<Option<Business>, StoreError> {
        let Some(mut business) = self.business(id)? else {
            return Ok(None);
        };
        business.status = Status::Inactive;
        put(&self.businesses, id, &business)?;
        Ok(Some(business))
    }

    /// Owner dashboard listing: includes deactivated records on purpose.
    pub fn businesses_by_owner(&self, owner: &str) -> Result<Vec<Business>, StoreError> {
        let mut records: Vec<Business> = scan(&self.businesses)?;
        records.retain(|b| b.owner == owner);
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    pub fn latest_businesses(&self, limit: usize) -> Result<Vec<Business>, StoreError> {
        let mut records = self.businesses()?;
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }

    /// Cities ranked by number of active businesses (group → sort → take →
    /// join, the popular-cities aggregation).
    pub fn popular_cities(&self, limit: usize) -> Result<Vec<PopularCity>, StoreError> {
        let mut counts: HashMap<String, u64> = HashMap::new();
        for business in self.businesses()? {
            *counts.entry(business.address.city).or_insert(0) += 1;
        }

        let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit);

        let mut result = Vec::with_capacity(ranked.len());
        for (city_id, total) in ranked {
            if let Some(city) = self.city(&city_id)?.filter(|c| c.status.is_active()) {
                result.push(PopularCity {
                    id: city.id,
                    name: city.name,
                    slug: city.slug,
                    image: city.image,
                    total_businesses: total,
                });
            }
        }
        Ok(result)
    }

    /// Resolve a business's references into a populated view. Dangling
    /// references are dropped rather than failing the read.
    pub fn populate(&self, business: &Business) -> Result<BusinessView, StoreError> {
        let mut categories = Vec::with_capacity(business.categories.len());
        for id in &business.categories {
            if let Some(category) = self.category(id)? {
                categories.push(category);
            }
        }

        let mut sub_categories = Vec::with_capacity(business.sub_categories.len());
        for id in &business.sub_categories {
            if let Some(sub) = self.sub_category(id)? {
                sub_categories.push(sub);
            }
        }

        let owner = self.user(&business.owner)?.as_ref().map(PublicUser::from);

        Ok(BusinessView {
            id: business.id.clone(),
            name: business.name.clone(),
            slug: business.slug.clone(),
            description: business.description.clone(),
            phone: business.phone.clone(),
            whatsapp: business.whatsapp.clone(),
            photos: business.photos.clone(),
            social: business.social.clone(),
            address: AddressView {
                street: business.address.street.clone(),
                number: business.address.number.clone(),
                city: self.city(&business.address.city)?,
                neighborhood: self.neighborhood(&business.address.neighborhood)?,
            },
            lat: business.lat.clone(),
            long: business.long.clone(),
            categories,
            sub_categories,
            owner,
            status: business.status,
            created_at: business.created_at,
        })
    }

    // --- Favorites ---

    // Key is "{user}/{business}", giving per-pair uniqueness and a prefix
    // scan for one user's bookmarks.
    fn favorite_key(user: &str, business: &str) -> String {
        format!("{user}/{business}")
    }

    pub fn add_favorite(&self, favorite: &Favorite) -> Result<(), StoreError> {
        put(
            &self.favorites,
            &Self::favorite_key(&favorite.user, &favorite.business),
            favorite,
        )
    }

    pub fn favorite(&self, user: &str, business: &str) -> Result<Option<Favorite>, StoreError> {
        get(&self.favorites, &Self::favorite_key(user, business))
    }

    pub fn favorites_by_user(&self, user: &str) -> Result<Vec<Favorite>, StoreError> {
        let mut records = Vec::new();
        for item in self.favorites.scan_prefix(format!("{user}/").as_bytes()) {
            let (_, value) = item?;
            records.push(serde_json::from_slice::<Favorite>(&value)?);
        }
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// Remove a user's bookmark of a business. Returns whether one existed.
    pub fn remove_favorite(&self, user: &str, business: &str) -> Result<bool, StoreError> {
        Ok(self
            .favorites
            .remove(Self::favorite_key(user, business).as_bytes())?
            .is_some())
    }

    // --- Users ---

    pub fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        reserve(
            &self.user_emails,
            &user.email.to_lowercase(),
            &user.id,
            "Este email já está em uso",
        )?;
        put(&self.users, &user.id, user)
    }

    pub fn user(&self, id: &str) -> Result<Option<User>, StoreError> {
        get(&self.users, id)
    }

    pub fn users(&self) -> Result<Vec<User>, StoreError> {
        let mut records: Vec<User> = scan(&self.users)?;
        records.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    pub fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let Some(id) = self.user_emails.get(email.to_lowercase().as_bytes())? else {
            return Ok(None);
        };
        let id = String::from_utf8_lossy(&id).to_string();
        self.user(&id)
    }

    pub fn update_user(&self, user: &User) -> Result<(), StoreError> {
        if let Some(old) = self.user(&user.id)? {
            if !old.email.eq_ignore_ascii_case(&user.email) {
                reserve(
                    &self.user_emails,
                    &user.email.to_lowercase(),
                    &user.id,
                    "Este email já está em uso",
                )?;
                self.user_emails.remove(old.email.to_lowercase().as_bytes())?;
            }
        }
        put(&self.users, &user.id, user)
    }

    /// Account removal is the one hard delete in the system.
    pub fn delete_user(&self, id: &str) -> Result<(), StoreError> {
        if let Some(user) = self.user(id)? {
            self.user_emails.remove(user.email.to_lowercase().as_bytes())?;
        }
        self.users.remove(id.as_bytes())?;
        Ok(())
    }
}
