use anyhow::{Context, Result};
use sqlx::PgPool;
use tokio::time::{Duration as TokioDuration, sleep};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{AppState, geocode, web::auth};

const CYCLE_INTERVAL_MINUTES: u64 = 10;
const GEOCODE_BATCH_SIZE: i64 = 20;
// Nominatim's public instance asks for at most one request per second.
const GEOCODE_REQUEST_DELAY: TokioDuration = TokioDuration::from_millis(1100);

pub fn spawn(state: AppState) {
    tokio::spawn(async move {
        let interval = TokioDuration::from_secs(CYCLE_INTERVAL_MINUTES * 60);
        loop {
            if let Err(err) = run_cycle(&state).await {
                error!(?err, "maintenance cycle failed");
            }
            sleep(interval).await;
        }
    });
}

async fn run_cycle(state: &AppState) -> Result<()> {
    let pool = state.pool();

    let sessions_purged = auth::purge_expired_sessions(&pool)
        .await
        .context("failed to purge expired sessions")?;

    let clubs_geocoded = geocode_backfill(state, &pool).await?;

    if sessions_purged > 0 || clubs_geocoded > 0 {
        info!(sessions_purged, clubs_geocoded, "maintenance cycle completed");
    }

    Ok(())
}

#[derive(sqlx::FromRow)]
struct PendingClub {
    id: Uuid,
    name: String,
    address: Option<String>,
    city: Option<String>,
    postal_code: Option<String>,
}

// Never-attempted clubs come first; clubs whose last attempt found nothing
// rotate to the back instead of blocking the batch every cycle.
const PENDING_CLUBS_QUERY: &str = "SELECT id, name, address, city, postal_code FROM clubs
     WHERE latitude IS NULL AND (address IS NOT NULL OR city IS NOT NULL)
     ORDER BY geocode_attempted_at ASC NULLS FIRST, created_at LIMIT $1";

/// Fills in coordinates for clubs that were imported without them. Works a
/// bounded batch per cycle; individual geocoding failures are logged and the
/// club is retried on a later cycle.
async fn geocode_backfill(state: &AppState, pool: &PgPool) -> Result<u64> {
    let pending = sqlx::query_as::<_, PendingClub>(PENDING_CLUBS_QUERY)
        .bind(GEOCODE_BATCH_SIZE)
        .fetch_all(pool)
        .await
        .context("failed to fetch clubs pending geocoding")?;

    if pending.is_empty() {
        return Ok(0);
    }

    let geocoder = state.geocoder();
    let mut updated = 0_u64;

    for club in pending {
        let query = geocode::club_geocode_query(
            club.address.as_deref(),
            club.postal_code.as_deref(),
            club.city.as_deref(),
        );

        match geocoder.geocode(&query).await {
            Ok(Some(coords)) => {
                sqlx::query(
                    "UPDATE clubs SET latitude = $2, longitude = $3,
                         geocode_attempted_at = NOW(), updated_at = NOW()
                     WHERE id = $1",
                )
                .bind(club.id)
                .bind(coords.latitude)
                .bind(coords.longitude)
                .execute(pool)
                .await
                .context("failed to store geocoded coordinates")?;
                updated += 1;
            }
            Ok(None) => {
                warn!(club = %club.name, %query, "geocoder found no match for club");
                mark_geocode_attempt(pool, club.id).await?;
            }
            Err(err) => {
                warn!(?err, club = %club.name, "geocoding request failed, will retry");
                mark_geocode_attempt(pool, club.id).await?;
            }
        }

        sleep(GEOCODE_REQUEST_DELAY).await;
    }

    Ok(updated)
}

/// Stamps the club so the next batch prefers clubs that have waited longest.
async fn mark_geocode_attempt(pool: &PgPool, club_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE clubs SET geocode_attempted_at = NOW() WHERE id = $1")
        .bind(club_id)
        .execute(pool)
        .await
        .context("failed to record geocoding attempt")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_batch_prefers_never_attempted_clubs() {
        // Guards the rotation: dropping the attempt ordering would reintroduce
        // a batch that retries the same un-geocodable clubs every cycle.
        assert!(
            PENDING_CLUBS_QUERY.contains("ORDER BY geocode_attempted_at ASC NULLS FIRST, created_at")
        );
        assert!(PENDING_CLUBS_QUERY.contains("latitude IS NULL"));
    }
}
