use crate::error::{AppError, Result};
use crate::models::{Account, Amount, Author, AuthorRequest, Book, BookRequest, Currency, Money, Role};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::{
    collections::{BTreeSet, HashMap},
    str::FromStr,
    sync::Arc,
};
use utoipa::IntoParams;

/// BookQuery
///
/// Structured filter for book lookups. Every present field narrows the result (AND).
/// Date bounds are strict, price bounds are inclusive, and `title_contains` is a
/// case-sensitive substring match.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BookQuery {
    /// Exact title.
    pub title: Option<String>,
    /// Substring of the title.
    pub title_contains: Option<String>,
    /// Only books published strictly after this date.
    pub published_after: Option<NaiveDate>,
    /// Only books published strictly before this date.
    pub published_before: Option<NaiveDate>,
    /// Last name of one of the authors.
    pub author_last_name: Option<String>,
    pub currency: Option<Currency>,
    #[param(value_type = Option<f64>)]
    pub min_price: Option<Amount>,
    #[param(value_type = Option<f64>)]
    pub max_price: Option<Amount>,
    /// Restricts to books linked to this author id (used by /authors/{id}/books).
    #[serde(skip)]
    #[param(ignore)]
    pub author_id: Option<i64>,
}

/// Repository Trait
///
/// The raw persistence contract. Implementations perform no authorization: every
/// call from the HTTP layer goes through `service::Library`, which checks the policy first.
///
/// Write operations run inside a single transaction. Update/delete return `None`/`false`
/// when the id does not exist so callers can answer with a clean 404.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Books ---
    async fn search_books(&self, query: &BookQuery) -> Result<Vec<Book>>;
    async fn get_book(&self, id: i64) -> Result<Option<Book>>;
    async fn insert_book(&self, req: &BookRequest) -> Result<Book>;
    async fn update_book(&self, id: i64, req: &BookRequest) -> Result<Option<Book>>;
    async fn delete_book(&self, id: i64) -> Result<bool>;

    // --- Authors ---
    async fn list_authors(&self) -> Result<Vec<Author>>;
    async fn get_author(&self, id: i64) -> Result<Option<Author>>;
    async fn find_authors_by_last_name(&self, last_name: &str) -> Result<Vec<Author>>;
    async fn find_authors_by_book_title(&self, title: &str) -> Result<Vec<Author>>;
    async fn insert_author(&self, req: &AuthorRequest) -> Result<Author>;
    async fn update_author(&self, id: i64, req: &AuthorRequest) -> Result<Option<Author>>;
    // Fails with Conflict while a book still references the author.
    async fn delete_author(&self, id: i64) -> Result<bool>;

    // --- Accounts ---
    async fn list_accounts(&self) -> Result<Vec<Account>>;
    async fn get_account(&self, id: i64) -> Result<Option<Account>>;
    async fn find_account_by_user_name(&self, user_name: &str) -> Result<Option<Account>>;
    async fn insert_account(
        &self,
        user_name: &str,
        password_hash: &str,
        roles: &BTreeSet<Role>,
    ) -> Result<Account>;
    async fn update_account(
        &self,
        id: i64,
        user_name: &str,
        password_hash: &str,
        roles: &BTreeSet<Role>,
    ) -> Result<Option<Account>>;
    async fn delete_account(&self, id: i64) -> Result<bool>;
}

/// RepositoryState
///
/// The shared handle to the persistence layer held in the application state.
pub type RepositoryState = Arc<dyn Repository>;

// --- Row types (internal) ---

#[derive(FromRow)]
struct BookRow {
    id: i64,
    title: String,
    description: String,
    published_date: NaiveDate,
    price_currency: String,
    price_amount: i64,
}

#[derive(FromRow)]
struct AuthorLink {
    book_id: i64,
    #[sqlx(flatten)]
    author: Author,
}

#[derive(FromRow)]
struct AccountRow {
    id: i64,
    user_name: String,
    password_hash: String,
}

#[derive(FromRow)]
struct RoleRow {
    account_id: i64,
    role: String,
}

const BOOK_COLUMNS: &str =
    "SELECT b.id, b.title, b.description, b.published_date, b.price_currency, b.price_amount FROM books b";

/// SqliteRepository
///
/// The `Repository` implementation backed by an sqlx SQLite pool.
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Loads the authors of every row in one query and assembles the `Book` values.
    async fn attach_authors(&self, rows: Vec<BookRow>) -> Result<Vec<Book>> {
        if rows.is_empty() {
            return Ok(vec![]);
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT ba.book_id, a.id, a.first_name, a.last_name \
             FROM book_authors ba JOIN authors a ON a.id = ba.author_id \
             WHERE ba.book_id IN (",
        );
        let mut ids = builder.separated(", ");
        for row in &rows {
            ids.push_bind(row.id);
        }
        ids.push_unseparated(") ORDER BY ba.book_id, ba.rowid");

        let links: Vec<AuthorLink> = builder.build_query_as().fetch_all(&self.pool).await?;

        let mut by_book: HashMap<i64, Vec<Author>> = HashMap::new();
        for link in links {
            by_book.entry(link.book_id).or_default().push(link.author);
        }

        rows.into_iter()
            .map(|row| {
                let authors = by_book.remove(&row.id).unwrap_or_default();
                book_from_row(row, authors)
            })
            .collect()
    }

    async fn load_roles(&self, account_ids: &[i64]) -> Result<HashMap<i64, BTreeSet<Role>>> {
        let mut roles: HashMap<i64, BTreeSet<Role>> = HashMap::new();
        if account_ids.is_empty() {
            return Ok(roles);
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT account_id, role FROM account_roles WHERE account_id IN (");
        let mut ids = builder.separated(", ");
        for id in account_ids {
            ids.push_bind(*id);
        }
        ids.push_unseparated(")");

        let rows: Vec<RoleRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        for row in rows {
            let role = Role::from_str(&row.role)
                .map_err(|_| AppError::Internal(format!("stored role '{}' is invalid", row.role)))?;
            roles.entry(row.account_id).or_default().insert(role);
        }
        Ok(roles)
    }

    async fn accounts_from_rows(&self, rows: Vec<AccountRow>) -> Result<Vec<Account>> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut roles = self.load_roles(&ids).await?;
        Ok(rows
            .into_iter()
            .map(|row| Account {
                roles: roles.remove(&row.id).unwrap_or_default(),
                id: row.id,
                user_name: row.user_name,
                password_hash: row.password_hash,
            })
            .collect())
    }

    async fn first_account(&self, rows: Vec<AccountRow>) -> Result<Option<Account>> {
        Ok(self.accounts_from_rows(rows).await?.into_iter().next())
    }
}

fn book_from_row(row: BookRow, authors: Vec<Author>) -> Result<Book> {
    let currency = Currency::from_str(&row.price_currency).map_err(|_| {
        AppError::Internal(format!("stored currency '{}' is invalid", row.price_currency))
    })?;
    Ok(Book {
        id: row.id,
        title: row.title,
        description: row.description,
        published_date: row.published_date,
        price: Money::new(currency, Amount::from_cents(row.price_amount)),
        authors,
    })
}

/// Rejects a book payload that links an author id missing from the store.
async fn ensure_authors_exist(conn: &mut SqliteConnection, ids: &[i64]) -> Result<()> {
    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COUNT(*) FROM authors WHERE id IN (");
    let mut sep = builder.separated(", ");
    for id in ids {
        sep.push_bind(*id);
    }
    sep.push_unseparated(")");

    let found: i64 = builder.build_query_scalar().fetch_one(&mut *conn).await?;
    if found != ids.len() as i64 {
        return Err(AppError::validation(format!(
            "book references unknown author ids: {:?}",
            ids
        )));
    }
    Ok(())
}

async fn link_authors(conn: &mut SqliteConnection, book_id: i64, ids: &[i64]) -> Result<()> {
    for author_id in ids {
        sqlx::query("INSERT INTO book_authors (book_id, author_id) VALUES (?, ?)")
            .bind(book_id)
            .bind(author_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn write_roles(conn: &mut SqliteConnection, account_id: i64, roles: &BTreeSet<Role>) -> Result<()> {
    for role in roles {
        sqlx::query("INSERT INTO account_roles (account_id, role) VALUES (?, ?)")
            .bind(account_id)
            .bind(role.as_str())
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl Repository for SqliteRepository {
    /// search_books
    ///
    /// Builds the filter with QueryBuilder so every user value is a bound parameter.
    async fn search_books(&self, query: &BookQuery) -> Result<Vec<Book>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(BOOK_COLUMNS);
        builder.push(" WHERE 1 = 1");

        if let Some(title) = &query.title {
            builder.push(" AND b.title = ").push_bind(title.clone());
        }
        if let Some(keyword) = &query.title_contains {
            // instr() keeps the match case-sensitive, unlike SQLite's LIKE.
            builder
                .push(" AND instr(b.title, ")
                .push_bind(keyword.clone())
                .push(") > 0");
        }
        if let Some(date) = query.published_after {
            builder.push(" AND b.published_date > ").push_bind(date);
        }
        if let Some(date) = query.published_before {
            builder.push(" AND b.published_date < ").push_bind(date);
        }
        if let Some(last_name) = &query.author_last_name {
            builder
                .push(
                    " AND EXISTS (SELECT 1 FROM book_authors ba JOIN authors a ON a.id = ba.author_id \
                     WHERE ba.book_id = b.id AND a.last_name = ",
                )
                .push_bind(last_name.clone())
                .push(")");
        }
        if let Some(author_id) = query.author_id {
            builder
                .push(" AND EXISTS (SELECT 1 FROM book_authors ba WHERE ba.book_id = b.id AND ba.author_id = ")
                .push_bind(author_id)
                .push(")");
        }
        if let Some(currency) = query.currency {
            builder.push(" AND b.price_currency = ").push_bind(currency.as_str());
        }
        if let Some(low) = query.min_price {
            builder.push(" AND b.price_amount >= ").push_bind(low.cents());
        }
        if let Some(high) = query.max_price {
            builder.push(" AND b.price_amount <= ").push_bind(high.cents());
        }

        builder.push(" ORDER BY b.id");

        let rows: Vec<BookRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        self.attach_authors(rows).await
    }

    async fn get_book(&self, id: i64) -> Result<Option<Book>> {
        let row: Option<BookRow> = sqlx::query_as(&format!("{BOOK_COLUMNS} WHERE b.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(self.attach_authors(vec![row]).await?.into_iter().next()),
            None => Ok(None),
        }
    }

    /// insert_book
    ///
    /// Inserts the book and its join rows in one transaction.
    async fn insert_book(&self, req: &BookRequest) -> Result<Book> {
        let author_ids = req.author_ids();
        let mut tx = self.pool.begin().await?;

        ensure_authors_exist(&mut tx, &author_ids).await?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO books (title, description, published_date, price_currency, price_amount) \
             VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&req.title)
        .bind(&req.description)
        .bind(req.published_date)
        .bind(req.price.currency.as_str())
        .bind(req.price.amount.cents())
        .fetch_one(&mut *tx)
        .await?;

        link_authors(&mut tx, id, &author_ids).await?;
        tx.commit().await?;

        tracing::debug!(book_id = id, "book inserted");
        self.get_book(id)
            .await?
            .ok_or_else(|| AppError::not_found("book", id))
    }

    /// update_book
    ///
    /// Replaces every column and the author links. The old links are removed explicitly.
    async fn update_book(&self, id: i64, req: &BookRequest) -> Result<Option<Book>> {
        let author_ids = req.author_ids();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE books SET title = ?, description = ?, published_date = ?, \
             price_currency = ?, price_amount = ? WHERE id = ?",
        )
        .bind(&req.title)
        .bind(&req.description)
        .bind(req.published_date)
        .bind(req.price.currency.as_str())
        .bind(req.price.amount.cents())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        ensure_authors_exist(&mut tx, &author_ids).await?;
        sqlx::query("DELETE FROM book_authors WHERE book_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        link_authors(&mut tx, id, &author_ids).await?;
        tx.commit().await?;

        self.get_book(id).await
    }

    async fn delete_book(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM book_authors WHERE book_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM books WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(deleted.rows_affected() > 0)
    }

    async fn list_authors(&self) -> Result<Vec<Author>> {
        Ok(
            sqlx::query_as("SELECT id, first_name, last_name FROM authors ORDER BY id")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn get_author(&self, id: i64) -> Result<Option<Author>> {
        Ok(
            sqlx::query_as("SELECT id, first_name, last_name FROM authors WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn find_authors_by_last_name(&self, last_name: &str) -> Result<Vec<Author>> {
        Ok(sqlx::query_as(
            "SELECT id, first_name, last_name FROM authors WHERE last_name = ? ORDER BY id",
        )
        .bind(last_name)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn find_authors_by_book_title(&self, title: &str) -> Result<Vec<Author>> {
        Ok(sqlx::query_as(
            r#"
            SELECT DISTINCT a.id, a.first_name, a.last_name
            FROM authors a
            JOIN book_authors ba ON ba.author_id = a.id
            JOIN books b ON b.id = ba.book_id
            WHERE b.title = ?
            ORDER BY a.id
            "#,
        )
        .bind(title)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_author(&self, req: &AuthorRequest) -> Result<Author> {
        Ok(sqlx::query_as(
            "INSERT INTO authors (first_name, last_name) VALUES (?, ?) \
             RETURNING id, first_name, last_name",
        )
        .bind(&req.first_name)
        .bind(&req.last_name)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn update_author(&self, id: i64, req: &AuthorRequest) -> Result<Option<Author>> {
        Ok(sqlx::query_as(
            "UPDATE authors SET first_name = ?, last_name = ? WHERE id = ? \
             RETURNING id, first_name, last_name",
        )
        .bind(&req.first_name)
        .bind(&req.last_name)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_author(&self, id: i64) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM authors WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(deleted.rows_affected() > 0)
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        let rows: Vec<AccountRow> =
            sqlx::query_as("SELECT id, user_name, password_hash FROM accounts ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        self.accounts_from_rows(rows).await
    }

    async fn get_account(&self, id: i64) -> Result<Option<Account>> {
        let rows: Vec<AccountRow> =
            sqlx::query_as("SELECT id, user_name, password_hash FROM accounts WHERE id = ?")
                .bind(id)
                .fetch_all(&self.pool)
                .await?;
        self.first_account(rows).await
    }

    async fn find_account_by_user_name(&self, user_name: &str) -> Result<Option<Account>> {
        let rows: Vec<AccountRow> =
            sqlx::query_as("SELECT id, user_name, password_hash FROM accounts WHERE user_name = ?")
                .bind(user_name)
                .fetch_all(&self.pool)
                .await?;
        self.first_account(rows).await
    }

    async fn insert_account(
        &self,
        user_name: &str,
        password_hash: &str,
        roles: &BTreeSet<Role>,
    ) -> Result<Account> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO accounts (user_name, password_hash) VALUES (?, ?) RETURNING id",
        )
        .bind(user_name)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .await?;

        write_roles(&mut tx, id, roles).await?;
        tx.commit().await?;

        self.get_account(id)
            .await?
            .ok_or_else(|| AppError::not_found("account", id))
    }

    async fn update_account(
        &self,
        id: i64,
        user_name: &str,
        password_hash: &str,
        roles: &BTreeSet<Role>,
    ) -> Result<Option<Account>> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE accounts SET user_name = ?, password_hash = ? WHERE id = ?")
            .bind(user_name)
            .bind(password_hash)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query("DELETE FROM account_roles WHERE account_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        write_roles(&mut tx, id, roles).await?;
        tx.commit().await?;

        self.get_account(id).await
    }

    async fn delete_account(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM account_roles WHERE account_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(deleted.rows_affected() > 0)
    }
}
