//! Command line client for the Guia Local API.
//!
//! Login stores the JWT in `.guia_token` next to the working directory;
//! the mutation commands read it back and send it as a Bearer header.

use clap::{Parser, Subcommand};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::fs;

const TOKEN_FILE: &str = ".guia_token";

#[derive(Parser)]
#[command(name = "guia-cli")]
#[command(about = "CLI para o Guia Local", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, default_value = "http://localhost:5000")]
    url: String,
}

#[derive(Subcommand)]
enum Commands {
    Register {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    Me,
    ListCities,
    PopularCities,
    ListNeighborhoods {
        #[arg(short, long)]
        city: Option<String>,
    },
    CreateNeighborhood {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        city: String,
    },
    ListCategories,
    CreateCategory {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        icon: Option<String>,
    },
    ListBusinesses,
    GetBusiness {
        #[arg(short, long)]
        slug: String,
    },
    Search {
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        city: Option<String>,
        #[arg(short = 'b', long)]
        neighborhood: Option<String>,
        #[arg(short = 'C', long)]
        category: Option<String>,
        #[arg(short = 's', long)]
        subcategory: Option<String>,
        #[arg(short, long)]
        page: Option<u32>,
        #[arg(long = "per-page")]
        per_page: Option<u32>,
        #[arg(short, long)]
        random: bool,
    },
    DeleteBusiness {
        #[arg(short, long)]
        id: String,
    },
    Logout,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

fn saved_token() -> String {
    fs::read_to_string(TOKEN_FILE).unwrap_or_default()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = Client::new();

    match cli.command {
        Commands::Register { name, email, password } => {
            let res = client.post(format!("{}/auth/register", cli.url))
                .json(&json!({ "name": name, "email": email, "password": password }))
                .send()
                .await?;
            if res.status().is_success() {
                let body: TokenResponse = res.json().await?;
                fs::write(TOKEN_FILE, body.token)?;
                println!("Registrado. Token salvo em {}", TOKEN_FILE);
            } else {
                println!("Falha no registro: {}", res.text().await?);
            }
        }
        Commands::Login { email, password } => {
            let res = client.post(format!("{}/auth/login", cli.url))
                .json(&json!({ "email": email, "password": password }))
                .send()
                .await?;
            if res.status().is_success() {
                let body: TokenResponse = res.json().await?;
                fs::write(TOKEN_FILE, body.token)?;
                println!("Logado. Token salvo em {}", TOKEN_FILE);
            } else {
                println!("Falha no login: {}", res.text().await?);
            }
        }
        Commands::Me => {
            let res = client.get(format!("{}/auth/me", cli.url))
                .header("Authorization", format!("Bearer {}", saved_token()))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::ListCities => {
            let res = client.get(format!("{}/cities", cli.url)).send().await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::PopularCities => {
            let res = client.get(format!("{}/cities/popular", cli.url)).send().await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::ListNeighborhoods { city } => {
            let mut req = client.get(format!("{}/neighborhoods", cli.url));
            if let Some(city) = city {
                req = req.query(&[("city", city)]);
            }
            let res = req.send().await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::CreateNeighborhood { name, city } => {
            let res = client.post(format!("{}/neighborhoods", cli.url))
                .header("Authorization", format!("Bearer {}", saved_token()))
                .json(&json!({ "name": name, "city": city }))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::ListCategories => {
            let res = client.get(format!("{}/categories", cli.url)).send().await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::CreateCategory { name, icon } => {
            let res = client.post(format!("{}/categories", cli.url))
                .header("Authorization", format!("Bearer {}", saved_token()))
                .json(&json!({ "name": name, "icon": icon }))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::ListBusinesses => {
            let res = client.get(format!("{}/businesses", cli.url)).send().await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::GetBusiness { slug } => {
            let res = client.get(format!("{}/businesses/slug/{}", cli.url, slug))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::Search { name, city, neighborhood, category, subcategory, page, per_page, random } => {
            let mut query: Vec<(&str, String)> = vec![];
            if let Some(name) = name {
                query.push(("name", name));
            }
            if let Some(city) = city {
                query.push(("city", city));
            }
            if let Some(neighborhood) = neighborhood {
                query.push(("neighborhood", neighborhood));
            }
            if let Some(category) = category {
                query.push(("category", category));
            }
            if let Some(subcategory) = subcategory {
                query.push(("subcategory", subcategory));
            }
            if let Some(page) = page {
                query.push(("page", page.to_string()));
            }
            if let Some(per_page) = per_page {
                query.push(("perPage", per_page.to_string()));
            }
            if random {
                query.push(("random", "true".to_string()));
            }
            let res = client.get(format!("{}/businesses/search", cli.url))
                .query(&query)
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::DeleteBusiness { id } => {
            let res = client.delete(format!("{}/businesses/{}", cli.url, id))
                .header("Authorization", format!("Bearer {}", saved_token()))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::Logout => {
            let _ = fs::remove_file(TOKEN_FILE);
            println!("Deslogado (token removido).");
        }
    }

    Ok(())
}
