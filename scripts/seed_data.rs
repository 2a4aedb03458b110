//! Seed script for the Guia Local directory.
//!
//! Populates the Sled store directly (no HTTP) with an admin account,
//! a few cities and neighborhoods, the base taxonomy and sample
//! businesses so the search pipeline has data to work with.
//! Run: cargo run --bin seed_data

use chrono::{Duration, Utc};

use guia_local::auth::hash_password;
use guia_local::config::Config;
use guia_local::models::{
    Address, Business, Category, City, Neighborhood, Role, SocialLinks, Status, SubCategory,
    User,
};
use guia_local::slug::slugify;
use guia_local::storage::Store;

fn city(id: &str, name: &str) -> City {
    City {
        id: id.to_string(),
        name: name.to_string(),
        slug: slugify(name),
        image: None,
        status: Status::Active,
        created_at: Utc::now(),
    }
}

fn neighborhood(id: &str, name: &str, city: &str) -> Neighborhood {
    Neighborhood {
        id: id.to_string(),
        name: name.to_lowercase(),
        slug: slugify(name),
        city: city.to_string(),
        status: Status::Active,
        created_at: Utc::now(),
    }
}

fn category(id: &str, name: &str) -> Category {
    Category {
        id: id.to_string(),
        name: name.to_lowercase(),
        slug: slugify(name),
        icon: None,
        status: Status::Active,
        created_at: Utc::now(),
    }
}

fn sub_category(id: &str, name: &str, category: &str) -> SubCategory {
    SubCategory {
        id: id.to_string(),
        name: name.to_lowercase(),
        slug: slugify(name),
        category: category.to_string(),
        icon: None,
        status: Status::Active,
        created_at: Utc::now(),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().init();

    let config = Config::load();
    let store = Store::open(&config.data_dir)?;

    let admin = User {
        id: "user-admin".to_string(),
        name: "Administrador".to_string(),
        email: "admin@guialocal.com.br".to_string(),
        password_hash: hash_password("admin123")?,
        phone: None,
        role: Role::Admin,
        created_at: Utc::now(),
    };
    let _ = store.insert_user(&admin); // Ignore if already seeded

    let owner = User {
        id: "user-owner".to_string(),
        name: "Dona Maria".to_string(),
        email: "maria@guialocal.com.br".to_string(),
        password_hash: hash_password("maria123")?,
        phone: Some("(12) 98888-1111".to_string()),
        role: Role::User,
        created_at: Utc::now(),
    };
    let _ = store.insert_user(&owner);

    for c in [
        city("city-taubate", "Taubaté"),
        city("city-sao-paulo", "São Paulo"),
        city("city-sorocaba", "Sorocaba"),
    ] {
        let _ = store.insert_city(&c);
    }

    for n in [
        neighborhood("n-taubate-centro", "Centro", "city-taubate"),
        neighborhood("n-taubate-independencia", "Independência", "city-taubate"),
        neighborhood("n-sp-centro", "Centro", "city-sao-paulo"),
        neighborhood("n-sorocaba-centro", "Centro", "city-sorocaba"),
    ] {
        let _ = store.put_neighborhood(&n);
    }

    for c in [
        category("cat-restaurante", "Restaurante"),
        category("cat-mercado", "Mercado"),
        category("cat-servicos", "Serviços"),
    ] {
        let _ = store.put_category(&c);
    }

    for s in [
        sub_category("sub-pizzaria", "Pizzaria", "cat-restaurante"),
        sub_category("sub-lanchonete", "Lanchonete", "cat-restaurante"),
        sub_category("sub-hortifruti", "Hortifruti", "cat-mercado"),
        sub_category("sub-eletricista", "Eletricista", "cat-servicos"),
    ] {
        let _ = store.put_sub_category(&s);
    }

    let samples = [
        ("biz-1", "Pizzaria do Zé", "city-taubate", "n-taubate-centro", "cat-restaurante", "sub-pizzaria"),
        ("biz-2", "Lanches da Esquina", "city-taubate", "n-taubate-centro", "cat-restaurante", "sub-lanchonete"),
        ("biz-3", "Hortifruti Central", "city-taubate", "n-taubate-independencia", "cat-mercado", "sub-hortifruti"),
        ("biz-4", "Pizzaria Paulistana", "city-sao-paulo", "n-sp-centro", "cat-restaurante", "sub-pizzaria"),
        ("biz-5", "Elétrica Sorocaba", "city-sorocaba", "n-sorocaba-centro", "cat-servicos", "sub-eletricista"),
    ];

    for (i, (id, name, city, neighborhood, category, sub)) in samples.iter().enumerate() {
        let business = Business {
            id: id.to_string(),
            name: name.to_string(),
            slug: slugify(name),
            description: format!("{} atendendo a região com qualidade.", name),
            phone: format!("(12) 9{:04}-0000", 8000 + i),
            whatsapp: None,
            photos: vec![],
            social: SocialLinks::default(),
            address: Address {
                street: Some("Rua Principal".to_string()),
                number: Some(format!("{}", 100 + i)),
                city: city.to_string(),
                neighborhood: neighborhood.to_string(),
            },
            lat: None,
            long: None,
            categories: vec![category.to_string()],
            sub_categories: vec![sub.to_string()],
            owner: owner.id.clone(),
            status: Status::Active,
            // Spread creation times so the listing order is visible
            created_at: Utc::now() + Duration::seconds(i as i64),
        };
        let _ = store.insert_business(&business);
    }

    tracing::info!("dados de exemplo carregados");
    println!("Seed concluído: admin@guialocal.com.br / admin123");

    Ok(())
}
