use sqlx::{Pool, Postgres, Row};

use roost_domain::property::Property;

use crate::error::StoreError;

#[derive(Clone)]
pub struct PgPropertyStore {
    pool: Pool<Postgres>,
}

impl PgPropertyStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        name: &str,
        description: &str,
        location: &str,
        price_per_night: f64,
    ) -> Result<Property, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO properties (name, description, location, price_per_night)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(location)
        .bind(price_per_night)
        .fetch_one(&self.pool)
        .await?;

        Ok(Property {
            id: row.try_get("id")?,
            name: name.to_string(),
            description: description.to_string(),
            location: location.to_string(),
            price_per_night,
        })
    }

    pub async fn find(&self, id: i64) -> Result<Option<Property>, StoreError> {
        let row = sqlx::query("SELECT * FROM properties WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| {
            Ok(Property {
                id: r.try_get("id")?,
                name: r.try_get("name")?,
                description: r.try_get("description")?,
                location: r.try_get("location")?,
                price_per_night: r.try_get("price_per_night")?,
            })
        })
        .transpose()
    }

    pub async fn list(&self) -> Result<Vec<Property>, StoreError> {
        let rows = sqlx::query("SELECT * FROM properties ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| {
                Ok(Property {
                    id: r.try_get("id")?,
                    name: r.try_get("name")?,
                    description: r.try_get("description")?,
                    location: r.try_get("location")?,
                    price_per_night: r.try_get("price_per_night")?,
                })
            })
            .collect()
    }
}
