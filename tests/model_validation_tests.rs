use bookstore::{
    AppError,
    models::{
        Account, AccountRequest, Amount, AuthorPatch, AuthorRequest, Book, BookPatch, BookRequest,
        Currency, Money, Role, check_text,
    },
};
use chrono::NaiveDate;
use serde_json::json;
use std::collections::BTreeSet;

fn book_request() -> BookRequest {
    BookRequest {
        title: "Rust in Action".to_string(),
        description: "Systems programming".to_string(),
        published_date: NaiveDate::from_ymd_opt(2021, 8, 10).unwrap(),
        price: Money::usd(3999),
        authors: vec![1],
    }
}

// --- Amount ---

#[test]
fn test_amount_parses_exact_cents() {
    assert_eq!("45.83".parse::<Amount>().unwrap().cents(), 4583);
    assert_eq!("42".parse::<Amount>().unwrap().cents(), 4200);
    assert_eq!("0.5".parse::<Amount>().unwrap().cents(), 50);
    assert_eq!("-1.25".parse::<Amount>().unwrap().cents(), -125);
}

#[test]
fn test_amount_rejects_three_fractional_digits() {
    let err = "1.234".parse::<Amount>().unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[test]
fn test_amount_rejects_garbage() {
    for raw in ["", ".", "abc", "1.2.3", "1e5"] {
        assert!(raw.parse::<Amount>().is_err(), "'{raw}' should not parse");
    }
}

#[test]
fn test_amount_display_keeps_two_digits() {
    assert_eq!(Amount::from_cents(4583).to_string(), "45.83");
    assert_eq!(Amount::from_cents(500).to_string(), "5.00");
    assert_eq!(Amount::from_cents(-7).to_string(), "-0.07");
}

#[test]
fn test_money_json_accepts_numbers_and_defaults_currency() {
    let money: Money = serde_json::from_value(json!({ "amount": 45.83 })).unwrap();
    assert_eq!(money.currency, Currency::Usd);
    assert_eq!(money.amount.cents(), 4583);

    let money: Money = serde_json::from_value(json!({ "currency": "EUR", "amount": "10.5" })).unwrap();
    assert_eq!(money, Money::new(Currency::Eur, Amount::from_cents(1050)));

    let bad = serde_json::from_value::<Money>(json!({ "amount": 1.999 }));
    assert!(bad.is_err());
}

#[test]
fn test_money_serializes_amount_as_number() {
    let value = serde_json::to_value(Money::usd(4274)).unwrap();
    assert_eq!(value, json!({ "currency": "USD", "amount": 42.74 }));
}

#[test]
fn test_money_must_be_positive() {
    assert!(Money::usd(1).validate().is_ok());
    assert!(matches!(Money::usd(0).validate(), Err(AppError::Validation(_))));
    assert!(matches!(Money::usd(-100).validate(), Err(AppError::Validation(_))));
}

// --- Text fields ---

#[test]
fn test_text_length_bounds() {
    assert!(check_text("title", "x").is_ok());
    assert!(check_text("title", &"x".repeat(255)).is_ok());
    assert!(check_text("title", &"x".repeat(256)).is_err());
    assert!(check_text("title", "").is_err());
    assert!(check_text("title", "   ").is_err());
}

#[test]
fn test_text_length_counts_characters_not_bytes() {
    assert!(check_text("last_name", &"é".repeat(255)).is_ok());
}

// --- Books ---

#[test]
fn test_valid_book_request() {
    assert!(book_request().validate().is_ok());
}

#[test]
fn test_book_without_authors_is_rejected() {
    let req = BookRequest {
        authors: vec![],
        ..book_request()
    };
    assert!(matches!(req.validate(), Err(AppError::Validation(_))));
}

#[test]
fn test_book_with_zero_price_is_rejected() {
    let req = BookRequest {
        price: Money::usd(0),
        ..book_request()
    };
    assert!(matches!(req.validate(), Err(AppError::Validation(_))));
}

#[test]
fn test_book_author_ids_are_deduplicated_in_order() {
    let req = BookRequest {
        authors: vec![3, 1, 3, 2, 1],
        ..book_request()
    };
    assert_eq!(req.author_ids(), vec![3, 1, 2]);
}

#[test]
fn test_book_patch_keeps_absent_fields() {
    let current = Book {
        id: 7,
        title: "Old".to_string(),
        description: "Desc".to_string(),
        published_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        price: Money::usd(1000),
        authors: vec![bookstore::models::Author {
            id: 4,
            first_name: "A".to_string(),
            last_name: "B".to_string(),
        }],
    };
    let patch = BookPatch {
        title: Some("New".to_string()),
        ..Default::default()
    };

    let merged = patch.apply(current);
    assert_eq!(merged.title, "New");
    assert_eq!(merged.description, "Desc");
    assert_eq!(merged.price, Money::usd(1000));
    assert_eq!(merged.authors, vec![4]);
}

// --- Authors ---

#[test]
fn test_author_requires_both_names() {
    let ok = AuthorRequest {
        first_name: "Felipe".to_string(),
        last_name: "Gutierrez".to_string(),
    };
    assert!(ok.validate().is_ok());

    let missing = AuthorRequest {
        first_name: String::new(),
        ..ok
    };
    assert!(matches!(missing.validate(), Err(AppError::Validation(_))));
}

#[test]
fn test_author_patch_merges() {
    let current = bookstore::models::Author {
        id: 1,
        first_name: "Rajesh".to_string(),
        last_name: "RV".to_string(),
    };
    let merged = AuthorPatch {
        last_name: Some("R.V.".to_string()),
        ..Default::default()
    }
    .apply(current);
    assert_eq!(merged.first_name, "Rajesh");
    assert_eq!(merged.last_name, "R.V.");
}

// --- Accounts ---

#[test]
fn test_account_roles_default_to_user() {
    let req: AccountRequest =
        serde_json::from_value(json!({ "user_name": "reader", "password": "secret" })).unwrap();
    assert!(req.validate().is_ok());
    assert_eq!(req.effective_roles(), BTreeSet::from([Role::User]));
}

#[test]
fn test_unknown_role_is_rejected() {
    let req = serde_json::from_value::<AccountRequest>(
        json!({ "user_name": "x", "password": "y", "roles": ["ROOT"] }),
    );
    assert!(req.is_err());
}

#[test]
fn test_account_never_exposes_password_hash() {
    let account = Account {
        id: 1,
        user_name: "admin".to_string(),
        password_hash: "$2b$04$secret".to_string(),
        roles: BTreeSet::from([Role::User, Role::Admin]),
    };

    let value = serde_json::to_value(&account).unwrap();
    assert!(value.get("password_hash").is_none());
    assert_eq!(value["roles"], json!(["USER", "ADMIN"]));
    assert!(!format!("{account:?}").contains("secret"));
}

#[test]
fn test_account_request_debug_hides_password() {
    let req = AccountRequest {
        user_name: "user".to_string(),
        password: "hunter2".to_string(),
        roles: BTreeSet::new(),
    };
    assert!(!format!("{req:?}").contains("hunter2"));
}

#[test]
fn test_role_and_currency_parse() {
    assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
    assert!("admin".parse::<Role>().is_err());
    assert_eq!("CAD".parse::<Currency>().unwrap(), Currency::Cad);
    assert!("GBP".parse::<Currency>().is_err());
}
