//! Serves two seeded agent pages.
//!
//! ```text
//! RUST_LOG=vitrine=debug cargo run --example corretor_site
//! curl 'http://127.0.0.1:8080/corretores/ana-souza?imoveis&limite=2'
//! curl -X POST http://127.0.0.1:8080/corretores/ana-souza/contato \
//!      -d '{"name":"Rui","email":"rui@example.com","message":"Posso visitar?"}'
//! ```

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use vitrine::profile::{AgentRecord, MemoryProfileStore, ProfileService, Property, routes::routes};
use vitrine::rate_limit::RateLimiter;
use vitrine::{Config, Server};

fn listing(id: u64, title: &str, price_cents: u64, bedrooms: u8, featured: bool) -> Property {
    Property {
        id,
        title: title.to_owned(),
        city: "Curitiba".to_owned(),
        price_cents,
        bedrooms,
        featured,
    }
}

fn seed() -> Vec<AgentRecord> {
    vec![
        AgentRecord {
            slug: "ana-souza".to_owned(),
            name: "Ana Souza".to_owned(),
            creci: "12345-F".to_owned(),
            bio: Some("Apartamentos e coberturas no Batel e no Água Verde.".to_owned()),
            phone: Some("+55 41 99999-0000".to_owned()),
            email: Some("ana@example.com".to_owned()),
            properties: vec![
                listing(1, "Apartamento 2 quartos", 52_000_000, 2, true),
                listing(2, "Cobertura duplex", 189_000_000, 4, false),
                listing(3, "Studio mobiliado", 31_500_000, 1, true),
            ],
            leads: Vec::new(),
        },
        AgentRecord {
            slug: "bruno-lima".to_owned(),
            name: "Bruno Lima".to_owned(),
            creci: "67890-J".to_owned(),
            bio: None,
            phone: Some("+55 48 98888-1111".to_owned()),
            email: None,
            properties: vec![Property {
                city: "Florianópolis".to_owned(),
                ..listing(10, "Casa de praia", 95_000_000, 3, true)
            }],
            leads: Vec::new(),
        },
    ]
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vitrine=info")),
        )
        .init();

    let config = Config::from_env()?;
    let limiter = Arc::new(RateLimiter::with_max_entries(config.rate_limit_max_entries));
    let store = Arc::new(MemoryProfileStore::with_agents(seed()));
    let service = Arc::new(ProfileService::new(store, Arc::clone(&limiter), &config));
    let router = Arc::new(routes(service, limiter, &config));

    let server = Server::bind(&config.bind_addr).await?;
    println!("Listening on http://{}", server.local_addr());

    server
        .serve(router, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
