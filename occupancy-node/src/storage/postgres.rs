use async_trait::async_trait;
use occupancy_common::OccupancySample;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use tracing::{debug, info};

use super::SampleSink;
use crate::error::{OccupancyError, Result};

pub struct PostgresSink {
    pool: PgPool,
}

impl PostgresSink {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("Connected to PostgreSQL with {} max connections", max_connections);
        Ok(Self { pool })
    }
}

fn insert_query(samples: &[OccupancySample]) -> Result<QueryBuilder<'_, Postgres>> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO people_count (camera_id, hall_name, zone, timestamp, people_count) ",
    );
    let mut counts = Vec::with_capacity(samples.len());
    for sample in samples {
        let count = i32::try_from(sample.people_count).map_err(|_| {
            OccupancyError::WriteError(format!("people count {} out of range", sample.people_count))
        })?;
        counts.push(count);
    }
    builder.push_values(samples.iter().zip(counts), |mut row, (sample, count)| {
        row.push_bind(&sample.camera_id)
            .push_bind(&sample.hall_name)
            .push_bind(&sample.zone_name)
            .push_bind(sample.timestamp)
            .push_bind(count);
    });
    Ok(builder)
}

#[async_trait]
impl SampleSink for PostgresSink {
    async fn write(&self, samples: &[OccupancySample]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let mut query = insert_query(samples)?;
        query.build().execute(&self.pool).await?;

        debug!("Inserted {} occupancy rows", samples.len());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        info!("PostgreSQL pool closed");
        Ok(())
    }
}
