use std::env;

use anyhow::{Context, Result};
use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::{geocode::GeocodeClient, imaging::ImageClient};

#[derive(Clone)]
pub struct AppState {
    pool: PgPool,
    imaging: ImageClient,
    geocoder: GeocodeClient,
}

impl AppState {
    pub async fn new() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL env var is missing")?;

        let imaging = ImageClient::from_env().context("failed to initialize image client")?;
        let geocoder = GeocodeClient::from_env().context("failed to initialize geocode client")?;

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&database_url)
            .await
            .context("failed to connect to Postgres")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run database migrations")?;

        Ok(Self {
            pool,
            imaging,
            geocoder,
        })
    }

    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }

    pub fn pool_ref(&self) -> &PgPool {
        &self.pool
    }

    pub fn image_client(&self) -> ImageClient {
        self.imaging.clone()
    }

    pub fn geocoder(&self) -> GeocodeClient {
        self.geocoder.clone()
    }
}
