//! A shopping cart priced through a flaky product service.
//!
//! Run with `RUST_LOG=resilient_fetch=debug` to see the breaker's events.

use resilient_fetch::{
    CircuitBreaker, Countable, FetchOutcome, ResilientFetcher, SelfClassified, Upstream,
};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct Product {
    name: String,
    price: f64,
}

#[derive(Debug)]
enum ProductError {
    Timeout,
    NotFound(String),
}

impl fmt::Display for ProductError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProductError::Timeout => write!(f, "product service timed out"),
            ProductError::NotFound(id) => write!(f, "product {} not found", id),
        }
    }
}

impl Error for ProductError {}

// A missing product says nothing about the service's health.
impl Countable for ProductError {
    fn is_countable(&self) -> bool {
        matches!(self, ProductError::Timeout)
    }
}

struct ProductService {
    catalog: HashMap<String, Product>,
    healthy: AtomicBool,
}

impl ProductService {
    fn new() -> Self {
        let catalog = [
            ("1", "Laptop", 999.99),
            ("2", "Mouse", 29.99),
            ("3", "Keyboard", 79.99),
        ]
        .into_iter()
        .map(|(id, name, price)| {
            (
                id.to_string(),
                Product {
                    name: name.to_string(),
                    price,
                },
            )
        })
        .collect();

        Self {
            catalog,
            healthy: AtomicBool::new(true),
        }
    }
}

impl Upstream<String, Product, ProductError> for ProductService {
    fn fetch(&self, id: &String) -> Result<Product, ProductError> {
        if !self.healthy.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(50));
            return Err(ProductError::Timeout);
        }
        self.catalog
            .get(id)
            .cloned()
            .ok_or_else(|| ProductError::NotFound(id.clone()))
    }
}

type ProductFetcher = ResilientFetcher<ProductService, String, Product, ProductError>;

/// Prices every line of the cart. Lines without any known price count as
/// zero and mark the cart degraded.
fn show_cart(fetcher: &ProductFetcher, items: &[(&str, u32)]) {
    let batch = fetcher.fetch_all(items.iter().map(|(id, _)| id.to_string()));
    let mut total = 0.0;

    for ((id, outcome), (_, quantity)) in batch.iter().zip(items) {
        match outcome {
            FetchOutcome::Fresh(product) => {
                total += product.price * f64::from(*quantity);
                println!("  {} x{} @ {:.2}", product.name, quantity, product.price);
            }
            FetchOutcome::Stale { value, age } => {
                total += value.price * f64::from(*quantity);
                println!(
                    "  {} x{} @ {:.2} (cached {}s ago)",
                    value.name,
                    quantity,
                    value.price,
                    age.as_secs()
                );
            }
            FetchOutcome::Unavailable => println!("  product {} x{}: price pending", id, quantity),
        }
    }

    println!(
        "  total {:.2}, degraded: {}, breaker: {}",
        total,
        batch.is_degraded(),
        fetcher.breaker().state()
    );
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let breaker = CircuitBreaker::<ProductError>::builder()
        .failure_threshold(3)
        .success_threshold(2)
        .recovery_timeout(Duration::from_secs(3))
        .classifier(SelfClassified::new())
        .build()?;
    let fetcher = ResilientFetcher::new(ProductService::new(), breaker);

    let cart = [("1", 1), ("2", 2)];

    println!("Product service healthy:");
    show_cart(&fetcher, &cart);

    println!("\nProduct service down, adding a keyboard:");
    fetcher.upstream().healthy.store(false, Ordering::SeqCst);
    let cart = [("1", 1), ("2", 2), ("3", 1)];
    for _ in 0..2 {
        show_cart(&fetcher, &cart);
        thread::sleep(Duration::from_secs(1));
    }

    println!("\nProduct service back, waiting for the recovery timeout:");
    fetcher.upstream().healthy.store(true, Ordering::SeqCst);
    thread::sleep(Duration::from_secs(3));
    show_cart(&fetcher, &cart);
    show_cart(&fetcher, &cart);

    let stats = fetcher.stats();
    println!(
        "\nfetches: {} fresh, {} stale, {} unavailable; breaker opened {} time(s)",
        stats.fresh, stats.stale, stats.unavailable, stats.breaker.times_opened
    );

    Ok(())
}
