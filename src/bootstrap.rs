use chrono::NaiveDate;
use std::collections::BTreeSet;

use crate::{
    error::{AppError, Result},
    models::{AccountRequest, AuthorRequest, BookRequest, Money, Role},
    policy::Identity,
    service::Library,
};

struct SeedBook {
    first_name: &'static str,
    last_name: &'static str,
    title: &'static str,
    description: &'static str,
    published: (i32, u32, u32),
    price_cents: i64,
}

const SEED_BOOKS: &[SeedBook] = &[
    SeedBook {
        first_name: "Felipe",
        last_name: "Gutierrez",
        title: "Spring Microservices",
        description: "Learn how to efficiently build and implement microservices in Spring, \
                      and how to use Docker and Mesos to push the boundaries. \
                      Examine a number of real-world use cases and hands-on code examples. \
                      Distribute your microservices in a completely new way",
        published: (2016, 6, 28),
        price_cents: 4583,
    },
    SeedBook {
        first_name: "Rajesh",
        last_name: "RV",
        title: "Pro Spring Boot",
        description: "A no-nonsense guide containing case studies and best practise for Spring Boot",
        published: (2016, 5, 21),
        price_cents: 4274,
    },
];

/// seed
///
/// Inserts the demo accounts and catalog through the guarded service, acting as the
/// synthetic `system` identity. That identity is a local value: it is never stored and
/// cannot be used once this function returns.
///
/// Safe to run against a database that was already seeded: existing accounts are kept
/// and books are only inserted into an empty catalog.
pub async fn seed(library: &Library) -> Result<()> {
    let system = Identity::system();
    let caller = Some(&system);

    let accounts = [
        ("user", BTreeSet::from([Role::User])),
        ("admin", BTreeSet::from([Role::User, Role::Admin])),
    ];

    for (name, roles) in accounts {
        if library.find_account_by_user_name(caller, name).await?.is_some() {
            tracing::debug!(account = name, "seed account already present");
            continue;
        }
        library
            .create_account(
                caller,
                AccountRequest {
                    user_name: name.to_string(),
                    password: name.to_string(),
                    roles,
                },
            )
            .await?;
    }

    if !library.list_books(caller).await?.is_empty() {
        tracing::info!("catalog already populated, skipping seed books");
        return Ok(());
    }

    for seed in SEED_BOOKS {
        let author = library
            .create_author(
                caller,
                AuthorRequest {
                    first_name: seed.first_name.to_string(),
                    last_name: seed.last_name.to_string(),
                },
            )
            .await?;

        let (y, m, d) = seed.published;
        let published_date = NaiveDate::from_ymd_opt(y, m, d)
            .ok_or_else(|| AppError::Internal(format!("invalid seed date {y}-{m}-{d}")))?;

        library
            .create_book(
                caller,
                BookRequest {
                    title: seed.title.to_string(),
                    description: seed.description.to_string(),
                    published_date,
                    price: Money::usd(seed.price_cents),
                    authors: vec![author.id],
                },
            )
            .await?;
    }

    tracing::info!("seed data inserted");
    Ok(())
}
