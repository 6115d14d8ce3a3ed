//! Scoped transactional boundary over a Postgres connection.

use sqlx::{PgConnection, PgPool, Postgres, Transaction};

use lingopath_domain::AssessmentError;

/// Unit of work wrapping one database transaction.
///
/// Commit must be requested explicitly; dropping the value (early return,
/// error propagation or unwind) rolls the transaction back.
pub struct SqlUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl SqlUnitOfWork {
    pub async fn begin(pool: &PgPool) -> Result<Self, AssessmentError> {
        let tx = pool.begin().await?;
        Ok(Self { tx })
    }

    /// Connection all statements inside the boundary run on.
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut *self.tx
    }

    pub async fn commit(self) -> Result<(), AssessmentError> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), AssessmentError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
