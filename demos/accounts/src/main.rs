use chrono::{DateTime, Duration as ChronoDuration, Utc};
use docstore::{Client, DocumentType, SearchQuery};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};

mod account;

use account::{join_date_converter, Account};

const DATA_SEED: u64 = 56475;
const WORKLOAD_SEED: u64 = 57892;
const ROUNDS: u32 = 100;
const DEFAULT_ACCOUNTS: u32 = 1_000;

/// 2024-01-01T00:00:00Z. Join dates fall in the ten years before it.
const BASE_EPOCH_SECONDS: i64 = 1_704_067_200;

const FIRST_NAMES: &[&str] = &[
    "Ada", "Alan", "Barbara", "Claude", "Donald", "Edsger", "Frances", "Grace", "John", "Katherine",
    "Linus", "Margaret", "Niklaus", "Radia", "Tony", "Whitfield",
];
const LAST_NAMES: &[&str] = &[
    "Allen", "Backus", "Dijkstra", "Hamilton", "Hopper", "Johnson", "Knuth", "Liskov", "Lovelace",
    "Perlman", "Ritchie", "Shannon", "Thompson", "Turing", "Wirth",
];
const DEPARTMENTS: &[&str] = &[
    "Books", "Electronics", "Garden", "Grocery", "Health", "Music", "Outdoors", "Sports", "Tools",
    "Toys",
];

/// `(query, offset, count, sort field, ascending)`
const SEARCHES: &[(&str, usize, usize, &str, Option<bool>)] = &[
    ("@department:Toys", 50, 50, "name", Some(true)),
    ("@balance:[10 100]", 50, 50, "balance", Some(false)),
    ("@balance:[10 100]", 50, 50, "balance", None),
    ("", 0, 1000, "balance", Some(false)),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let endpoint =
        std::env::var("DOCSTORE_ENDPOINT").unwrap_or_else(|_| "localhost:6379".to_string());
    let count = account_count(std::env::var("DOCSTORE_ACCOUNTS").ok().as_deref())?;

    let mut client = Client::<Account>::for_type()?;
    client.codec_mut().add_converter(join_date_converter());

    log::info!("Connecting to {endpoint}");
    client.connect(&endpoint).await?;

    let result = run(&client, count).await;
    client.dispose().await?;
    result
}

/// `DOCSTORE_ACCOUNTS`, defaulting to 1000. The workload needs at least one account.
fn account_count(raw: Option<&str>) -> Result<u32, String> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_ACCOUNTS);
    };
    match raw.trim().parse::<u32>() {
        Ok(0) => Err("DOCSTORE_ACCOUNTS must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("DOCSTORE_ACCOUNTS must be a number, got '{raw}'")),
    }
}

async fn run(client: &Client<Account>, count: u32) -> Result<(), Box<dyn std::error::Error>> {
    client.rebuild_index(&Account::schema()).await?;

    let started = Instant::now();
    let mut rng = StdRng::seed_from_u64(DATA_SEED);
    for id in 1..=count {
        let account = generate_account(&mut rng, id);
        client.set(&id.to_string(), &account).await?;
    }
    log::info!("Seeded {count} accounts in {:?}", started.elapsed());

    let mut rng = StdRng::seed_from_u64(WORKLOAD_SEED);

    let mut elapsed = Duration::ZERO;
    for _ in 0..ROUNDS {
        let id = rng.gen_range(1..=count).to_string();
        let started = Instant::now();
        if client.get(&id).await?.is_none() {
            log::warn!("Account {id} is missing");
        }
        elapsed += started.elapsed();
    }
    log::info!("get: {ROUNDS} rounds, mean {:?}", elapsed / ROUNDS);

    let mut elapsed = Duration::ZERO;
    for _ in 0..ROUNDS {
        let id = rng.gen_range(1..=count).to_string();
        let amount = round_cents(rng.gen_range(-10.0..10.0));
        let started = Instant::now();
        client
            .update(&id, |account| {
                let balance = round_cents(account.balance + amount);
                account.with_balance(balance)
            })
            .await?;
        elapsed += started.elapsed();
    }
    log::info!("update: {ROUNDS} rounds, mean {:?}", elapsed / ROUNDS);

    for &(text, offset, count, sort_by, ascending) in SEARCHES {
        let query = SearchQuery::new(text)
            .limit(offset, count)
            .sort_by(sort_by, ascending);

        let mut elapsed = Duration::ZERO;
        let mut returned = 0;
        let mut total = 0;
        for _ in 0..ROUNDS {
            let started = Instant::now();
            let results = client.search_with(&query).await?;
            elapsed += started.elapsed();
            returned = results.len();
            total = results.total;
        }
        log::info!(
            "search {:?} offset={offset} count={count} sort={sort_by} asc={ascending:?}: \
             {returned} of {total} hits, mean {:?}",
            query.effective_text(),
            elapsed / ROUNDS
        );
    }

    Ok(())
}

fn generate_account(rng: &mut StdRng, id: u32) -> Account {
    let first = FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())];
    let last = LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())];
    let department = DEPARTMENTS[rng.gen_range(0..DEPARTMENTS.len())];
    let seconds_ago = rng.gen_range(0..3650 * 86_400);

    Account {
        id,
        customer_name: format!("{first} {last}"),
        customer_department: department.to_string(),
        iban: generate_iban(rng),
        balance: round_cents(rng.gen_range(0.0..1000.0)),
        join_date: join_date(seconds_ago),
    }
}

/// Whole seconds only, so the date survives the unix-seconds converter.
fn join_date(seconds_ago: i64) -> DateTime<Utc> {
    DateTime::<Utc>::default() + ChronoDuration::seconds(BASE_EPOCH_SECONDS - seconds_ago)
}

/// A GB-shaped IBAN. The check digits are not valid.
fn generate_iban(rng: &mut StdRng) -> String {
    let bank: String = (0..4).map(|_| rng.gen_range(b'A'..=b'Z') as char).collect();
    let account: String = (0..14).map(|_| char::from(b'0' + rng.gen_range(0..10u8))).collect();
    format!("GB{:02}{bank}{account}", rng.gen_range(10..100))
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
