//! Books repository for database operations

use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::book::Book,
};

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get book by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Get book by ID inside a pass, locking the row for update
    pub async fn get_for_update(&self, conn: &mut PgConnection, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Load a set of books by ID inside a pass, locked for update
    pub async fn list_for_update(
        &self,
        conn: &mut PgConnection,
        ids: &[i32],
    ) -> AppResult<Vec<Book>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let books = sqlx::query_as::<_, Book>(
            "SELECT * FROM books WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        )
        .bind(ids)
        .fetch_all(&mut *conn)
        .await?;
        Ok(books)
    }

    /// Persist the inventory pair after a mutation.
    ///
    /// Always writes available_copies and status together so the two fields
    /// never land in storage mutually inconsistent.
    pub async fn update_inventory(&self, conn: &mut PgConnection, book: &Book) -> AppResult<()> {
        sqlx::query("UPDATE books SET available_copies = $1, status = $2 WHERE id = $3")
            .bind(book.available_copies)
            .bind(book.status)
            .bind(book.id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}
