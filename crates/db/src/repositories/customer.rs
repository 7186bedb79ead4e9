use sqlx::{sqlite::SqliteRow, Row};

use ordermate_core::domain::customer::{Customer, CustomerId};

use super::{CustomerRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCustomerRepository {
    pool: DbPool,
}

impl SqlCustomerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CustomerRepository for SqlCustomerRepository {
    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, email, address FROM customers WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(customer_from_row).transpose()
    }

    async fn query_by_email(&self, email: &str) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, email, address FROM customers WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.map(customer_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<Customer>, RepositoryError> {
        let rows = sqlx::query("SELECT id, name, email, address FROM customers ORDER BY rowid ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(customer_from_row).collect()
    }

    async fn find_by_name_and_address(
        &self,
        name: &str,
        address: &str,
    ) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, email, address
             FROM customers
             WHERE name = ? AND address = ?
             ORDER BY rowid ASC
             LIMIT 1",
        )
        .bind(name)
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;

        row.map(customer_from_row).transpose()
    }

    async fn insert(&self, customer: Customer) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO customers (id, name, email, address) VALUES (?, ?, ?, ?)",
        )
        .bind(&customer.id.0)
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.address)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                Err(RepositoryError::Conflict(format!(
                    "customer with email `{}` already exists",
                    customer.email
                )))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn update_address(
        &self,
        id: &CustomerId,
        address: &str,
    ) -> Result<Option<Customer>, RepositoryError> {
        let updated = sqlx::query("UPDATE customers SET address = ? WHERE id = ?")
            .bind(address)
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_by_id(id).await
    }
}

fn customer_from_row(row: SqliteRow) -> Result<Customer, RepositoryError> {
    Ok(Customer {
        id: CustomerId(row.try_get("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        address: row.try_get("address")?,
    })
}

#[cfg(test)]
mod tests {
    use ordermate_core::domain::customer::{Customer, CustomerId, CustomerLookup};

    use super::SqlCustomerRepository;
    use crate::migrations;
    use crate::repositories::{CustomerRepository, RepositoryError};
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn customer(name: &str, email: &str, address: &str) -> Customer {
        Customer::from_lookup(&CustomerLookup::new(Some(name), Some(email), Some(address)))
    }

    #[tokio::test]
    async fn sql_customer_repo_round_trip() {
        let repo = SqlCustomerRepository::new(setup_pool().await);
        let alice = customer("Alice", "a@x.com", "1 Orchard Rd");

        repo.insert(alice.clone()).await.expect("insert");

        assert_eq!(repo.find_by_id(&alice.id).await.expect("by id"), Some(alice.clone()));
        assert_eq!(repo.find_by_email(" A@x.com").await.expect("by email"), Some(alice.clone()));
        assert_eq!(
            repo.find_by_name_and_address("Alice", "1 Orchard Rd").await.expect("by name"),
            Some(alice.clone())
        );
        assert_eq!(repo.list().await.expect("list"), vec![alice]);
    }

    #[tokio::test]
    async fn duplicate_email_insert_is_a_conflict() {
        let repo = SqlCustomerRepository::new(setup_pool().await);

        repo.insert(customer("Alice", "a@x.com", "")).await.expect("first insert");
        let error = repo
            .insert(customer("Alice Again", "a@x.com", ""))
            .await
            .expect_err("second insert must conflict");

        assert!(matches!(error, RepositoryError::Conflict(_)));
        assert_eq!(repo.list().await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn customers_without_email_do_not_collide() {
        let repo = SqlCustomerRepository::new(setup_pool().await);

        repo.insert(customer("Bob", "", "2 Bras Basah")).await.expect("first");
        repo.insert(customer("Carol", "", "3 Bras Basah")).await.expect("second");

        assert_eq!(repo.list().await.expect("list").len(), 2);
    }

    #[tokio::test]
    async fn update_address_returns_the_updated_record() {
        let repo = SqlCustomerRepository::new(setup_pool().await);
        let alice = customer("Alice", "a@x.com", "1 Orchard Rd");
        repo.insert(alice.clone()).await.expect("insert");

        let updated = repo
            .update_address(&alice.id, "9 Changi Rd")
            .await
            .expect("update")
            .expect("customer exists");
        assert_eq!(updated.address, "9 Changi Rd");

        let missing = repo
            .update_address(&CustomerId("missing".to_string()), "anywhere")
            .await
            .expect("update missing");
        assert!(missing.is_none());
    }
}
