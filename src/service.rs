use chrono::NaiveDate;
use std::{collections::BTreeSet, sync::Arc};
use tokio::sync::OnceCell;

use crate::{
    error::{AppError, Result},
    models::{
        Account, AccountPatch, AccountRequest, Amount, Author, AuthorPatch, AuthorRequest, Book,
        BookPatch, BookRequest, Currency, Role, check_text,
    },
    password,
    policy::{self, Identity, Operation, Resource},
    repository::{BookQuery, RepositoryState},
};

/// Library
///
/// The guarded entry point to the store. Every public operation takes the caller's
/// identity as its first argument and runs `policy::check` before touching the
/// repository. Validation runs after authorization, so an anonymous caller always
/// gets `Unauthenticated`, never a validation error.
#[derive(Clone)]
pub struct Library {
    repo: RepositoryState,
    bcrypt_cost: u32,
    // Hash checked against when the user name is unknown; built on first use at `bcrypt_cost`.
    decoy_hash: Arc<OnceCell<String>>,
}

const DECOY_PASSWORD: &str = "decoy-password-never-assigned";

impl Library {
    pub fn new(repo: RepositoryState, bcrypt_cost: u32) -> Self {
        Self {
            repo,
            bcrypt_cost,
            decoy_hash: Arc::new(OnceCell::new()),
        }
    }

    /// authenticate
    ///
    /// Resolves HTTP Basic credentials to an identity. Not guarded: this is the step
    /// that produces the identity the guards consume.
    ///
    /// An unknown user name still pays for one bcrypt verification, so response time
    /// does not reveal which accounts exist.
    pub async fn authenticate(&self, user_name: &str, password: &str) -> Result<Option<Identity>> {
        let Some(account) = self.repo.find_account_by_user_name(user_name).await? else {
            let decoy = self.decoy_hash().await?;
            password::verify_blocking(password.to_string(), decoy).await?;
            tracing::debug!(user = %user_name, "unknown user name");
            return Ok(None);
        };

        if !password::verify_blocking(password.to_string(), account.password_hash.clone()).await? {
            tracing::debug!(user = %user_name, "password mismatch");
            return Ok(None);
        }

        Ok(Some(Identity {
            user_name: account.user_name,
            roles: account.roles,
        }))
    }

    async fn decoy_hash(&self) -> Result<String> {
        let cost = self.bcrypt_cost;
        self.decoy_hash
            .get_or_try_init(|| password::hash_blocking(DECOY_PASSWORD.to_string(), cost))
            .await
            .cloned()
    }

    // --- Books ---

    pub async fn list_books(&self, caller: Option<&Identity>) -> Result<Vec<Book>> {
        policy::check(caller, Resource::Book, Operation::Read)?;
        self.repo.search_books(&BookQuery::default()).await
    }

    pub async fn get_book(&self, caller: Option<&Identity>, id: i64) -> Result<Book> {
        policy::check(caller, Resource::Book, Operation::Read)?;
        self.repo
            .get_book(id)
            .await?
            .ok_or_else(|| AppError::not_found("book", id))
    }

    pub async fn search_books(&self, caller: Option<&Identity>, query: &BookQuery) -> Result<Vec<Book>> {
        policy::check(caller, Resource::Book, Operation::Read)?;
        self.repo.search_books(query).await
    }

    pub async fn find_books_by_title(&self, caller: Option<&Identity>, title: &str) -> Result<Vec<Book>> {
        let query = BookQuery {
            title: Some(title.to_string()),
            ..Default::default()
        };
        self.search_books(caller, &query).await
    }

    pub async fn find_books_by_title_contains(
        &self,
        caller: Option<&Identity>,
        keyword: &str,
    ) -> Result<Vec<Book>> {
        let query = BookQuery {
            title_contains: Some(keyword.to_string()),
            ..Default::default()
        };
        self.search_books(caller, &query).await
    }

    pub async fn find_books_published_after(
        &self,
        caller: Option<&Identity>,
        date: NaiveDate,
    ) -> Result<Vec<Book>> {
        let query = BookQuery {
            published_after: Some(date),
            ..Default::default()
        };
        self.search_books(caller, &query).await
    }

    pub async fn find_books_by_title_contains_published_after(
        &self,
        caller: Option<&Identity>,
        keyword: &str,
        date: NaiveDate,
    ) -> Result<Vec<Book>> {
        let query = BookQuery {
            title_contains: Some(keyword.to_string()),
            published_after: Some(date),
            ..Default::default()
        };
        self.search_books(caller, &query).await
    }

    pub async fn find_books_by_title_contains_and_price_between(
        &self,
        caller: Option<&Identity>,
        keyword: &str,
        currency: Currency,
        low: Amount,
        high: Amount,
    ) -> Result<Vec<Book>> {
        let query = BookQuery {
            title_contains: Some(keyword.to_string()),
            currency: Some(currency),
            min_price: Some(low),
            max_price: Some(high),
            ..Default::default()
        };
        self.search_books(caller, &query).await
    }

    pub async fn find_books_by_author_last_name(
        &self,
        caller: Option<&Identity>,
        last_name: &str,
    ) -> Result<Vec<Book>> {
        let query = BookQuery {
            author_last_name: Some(last_name.to_string()),
            ..Default::default()
        };
        self.search_books(caller, &query).await
    }

    pub async fn book_authors(&self, caller: Option<&Identity>, id: i64) -> Result<Vec<Author>> {
        policy::check(caller, Resource::Author, Operation::Read)?;
        Ok(self.get_book(caller, id).await?.authors)
    }

    pub async fn create_book(&self, caller: Option<&Identity>, req: BookRequest) -> Result<Book> {
        let who = policy::check(caller, Resource::Book, Operation::Create)?;
        req.validate()?;
        let book = self.repo.insert_book(&req).await?;
        tracing::info!(user = %who.user_name, book_id = book.id, "book created");
        Ok(book)
    }

    pub async fn replace_book(&self, caller: Option<&Identity>, id: i64, req: BookRequest) -> Result<Book> {
        let who = policy::check(caller, Resource::Book, Operation::Update)?;
        req.validate()?;
        let book = self
            .repo
            .update_book(id, &req)
            .await?
            .ok_or_else(|| AppError::not_found("book", id))?;
        tracing::info!(user = %who.user_name, book_id = id, "book updated");
        Ok(book)
    }

    pub async fn patch_book(&self, caller: Option<&Identity>, id: i64, patch: BookPatch) -> Result<Book> {
        policy::check(caller, Resource::Book, Operation::Update)?;
        let current = self
            .repo
            .get_book(id)
            .await?
            .ok_or_else(|| AppError::not_found("book", id))?;
        self.replace_book(caller, id, patch.apply(current)).await
    }

    pub async fn delete_book(&self, caller: Option<&Identity>, id: i64) -> Result<()> {
        let who = policy::check(caller, Resource::Book, Operation::Delete)?;
        if !self.repo.delete_book(id).await? {
            return Err(AppError::not_found("book", id));
        }
        tracing::info!(user = %who.user_name, book_id = id, "book deleted");
        Ok(())
    }

    // --- Authors ---

    pub async fn list_authors(&self, caller: Option<&Identity>) -> Result<Vec<Author>> {
        policy::check(caller, Resource::Author, Operation::Read)?;
        self.repo.list_authors().await
    }

    pub async fn get_author(&self, caller: Option<&Identity>, id: i64) -> Result<Author> {
        policy::check(caller, Resource::Author, Operation::Read)?;
        self.repo
            .get_author(id)
            .await?
            .ok_or_else(|| AppError::not_found("author", id))
    }

    pub async fn find_authors_by_last_name(
        &self,
        caller: Option<&Identity>,
        last_name: &str,
    ) -> Result<Vec<Author>> {
        policy::check(caller, Resource::Author, Operation::Read)?;
        self.repo.find_authors_by_last_name(last_name).await
    }

    pub async fn find_authors_by_book_title(
        &self,
        caller: Option<&Identity>,
        title: &str,
    ) -> Result<Vec<Author>> {
        policy::check(caller, Resource::Author, Operation::Read)?;
        self.repo.find_authors_by_book_title(title).await
    }

    pub async fn author_books(&self, caller: Option<&Identity>, id: i64) -> Result<Vec<Book>> {
        // Surfaces a 404 for an unknown author instead of an empty list.
        self.get_author(caller, id).await?;
        let query = BookQuery {
            author_id: Some(id),
            ..Default::default()
        };
        self.search_books(caller, &query).await
    }

    pub async fn create_author(&self, caller: Option<&Identity>, req: AuthorRequest) -> Result<Author> {
        let who = policy::check(caller, Resource::Author, Operation::Create)?;
        req.validate()?;
        let author = self.repo.insert_author(&req).await?;
        tracing::info!(user = %who.user_name, author_id = author.id, "author created");
        Ok(author)
    }

    pub async fn replace_author(
        &self,
        caller: Option<&Identity>,
        id: i64,
        req: AuthorRequest,
    ) -> Result<Author> {
        policy::check(caller, Resource::Author, Operation::Update)?;
        req.validate()?;
        self.repo
            .update_author(id, &req)
            .await?
            .ok_or_else(|| AppError::not_found("author", id))
    }

    pub async fn patch_author(&self, caller: Option<&Identity>, id: i64, patch: AuthorPatch) -> Result<Author> {
        policy::check(caller, Resource::Author, Operation::Update)?;
        let current = self
            .repo
            .get_author(id)
            .await?
            .ok_or_else(|| AppError::not_found("author", id))?;
        self.replace_author(caller, id, patch.apply(current)).await
    }

    pub async fn delete_author(&self, caller: Option<&Identity>, id: i64) -> Result<()> {
        let who = policy::check(caller, Resource::Author, Operation::Delete)?;
        if !self.repo.delete_author(id).await? {
            return Err(AppError::not_found("author", id));
        }
        tracing::info!(user = %who.user_name, author_id = id, "author deleted");
        Ok(())
    }

    // --- Accounts ---

    pub async fn list_accounts(&self, caller: Option<&Identity>) -> Result<Vec<Account>> {
        policy::check(caller, Resource::Account, Operation::Read)?;
        self.repo.list_accounts().await
    }

    pub async fn get_account(&self, caller: Option<&Identity>, id: i64) -> Result<Account> {
        policy::check(caller, Resource::Account, Operation::Read)?;
        self.repo
            .get_account(id)
            .await?
            .ok_or_else(|| AppError::not_found("account", id))
    }

    pub async fn find_account_by_user_name(
        &self,
        caller: Option<&Identity>,
        user_name: &str,
    ) -> Result<Option<Account>> {
        policy::check(caller, Resource::Account, Operation::Read)?;
        self.repo.find_account_by_user_name(user_name).await
    }

    /// create_account
    ///
    /// Hashes the password before it reaches the store; the plaintext is dropped here.
    pub async fn create_account(&self, caller: Option<&Identity>, req: AccountRequest) -> Result<Account> {
        let who = policy::check(caller, Resource::Account, Operation::Create)?;
        req.validate()?;
        let roles = req.effective_roles();
        let hash = password::hash_blocking(req.password, self.bcrypt_cost).await?;
        let account = self.repo.insert_account(&req.user_name, &hash, &roles).await?;
        tracing::info!(user = %who.user_name, account = %account.user_name, "account created");
        Ok(account)
    }

    pub async fn replace_account(
        &self,
        caller: Option<&Identity>,
        id: i64,
        req: AccountRequest,
    ) -> Result<Account> {
        let who = policy::check(caller, Resource::Account, Operation::Update)?;
        req.validate()?;
        let roles = req.effective_roles();
        let hash = password::hash_blocking(req.password, self.bcrypt_cost).await?;
        self.store_account(who, id, &req.user_name, &hash, &roles).await
    }

    /// patch_account
    ///
    /// Any USER may change any account, roles included. A USER can therefore grant
    /// itself ADMIN; the policy table only reserves account deletion for ADMIN.
    pub async fn patch_account(
        &self,
        caller: Option<&Identity>,
        id: i64,
        patch: AccountPatch,
    ) -> Result<Account> {
        let who = policy::check(caller, Resource::Account, Operation::Update)?;
        let current = self
            .repo
            .get_account(id)
            .await?
            .ok_or_else(|| AppError::not_found("account", id))?;

        let user_name = patch.user_name.unwrap_or(current.user_name);
        check_text("user_name", &user_name)?;

        let hash = match patch.password {
            Some(plain) => {
                check_text("password", &plain)?;
                password::hash_blocking(plain, self.bcrypt_cost).await?
            }
            None => current.password_hash,
        };

        let roles = match patch.roles {
            Some(roles) if roles.is_empty() => {
                return Err(AppError::validation("an account needs at least one role"));
            }
            Some(roles) => roles,
            None => current.roles,
        };

        self.store_account(who, id, &user_name, &hash, &roles).await
    }

    async fn store_account(
        &self,
        who: &Identity,
        id: i64,
        user_name: &str,
        hash: &str,
        roles: &BTreeSet<Role>,
    ) -> Result<Account> {
        let account = self
            .repo
            .update_account(id, user_name, hash, roles)
            .await?
            .ok_or_else(|| AppError::not_found("account", id))?;
        tracing::info!(user = %who.user_name, account_id = id, "account updated");
        Ok(account)
    }

    pub async fn delete_account(&self, caller: Option<&Identity>, id: i64) -> Result<()> {
        let who = policy::check(caller, Resource::Account, Operation::Delete)?;
        if !self.repo.delete_account(id).await? {
            return Err(AppError::not_found("account", id));
        }
        tracing::info!(user = %who.user_name, account_id = id, "account deleted");
        Ok(())
    }
}
