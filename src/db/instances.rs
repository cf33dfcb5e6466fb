use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::models::{Credentials, ServiceInstance, ServiceType};

const COLUMNS: &str = "id, service_type, display_name, url, api_key, token, username, password, \
    api_key1, api_key2, api_key3, api_key4, api_key5, site_manager_api_key, \
    enabled, sort_order, last_saved";

#[derive(sqlx::FromRow)]
struct InstanceRow {
    id: String,
    service_type: String,
    display_name: String,
    url: Option<String>,
    api_key: Option<String>,
    token: Option<String>,
    username: Option<String>,
    password: Option<String>,
    api_key1: Option<String>,
    api_key2: Option<String>,
    api_key3: Option<String>,
    api_key4: Option<String>,
    api_key5: Option<String>,
    site_manager_api_key: Option<String>,
    enabled: bool,
    sort_order: i64,
    last_saved: String,
}

impl TryFrom<InstanceRow> for ServiceInstance {
    type Error = StoreError;

    fn try_from(row: InstanceRow) -> Result<Self, Self::Error> {
        let service_type: ServiceType = row.service_type.parse().map_err(|t| StoreError::Corrupt {
            id: row.id.clone(),
            reason: format!("unknown service type '{t}'"),
        })?;
        let last_saved = DateTime::parse_from_rfc3339(&row.last_saved)
            .map_err(|e| StoreError::Corrupt {
                id: row.id.clone(),
                reason: format!("bad lastSaved: {e}"),
            })?
            .with_timezone(&Utc);

        Ok(ServiceInstance {
            id: row.id,
            service_type,
            display_name: row.display_name,
            url: row.url,
            credentials: Credentials {
                api_key: row.api_key,
                token: row.token,
                username: row.username,
                password: row.password,
                api_key1: row.api_key1,
                api_key2: row.api_key2,
                api_key3: row.api_key3,
                api_key4: row.api_key4,
                api_key5: row.api_key5,
                site_manager_api_key: row.site_manager_api_key,
            },
            enabled: row.enabled,
            order: row.sort_order,
            last_saved: Some(last_saved),
        })
    }
}

/// Durable id -> instance mapping. Every call goes to the database; nothing is
/// cached in process.
#[derive(Clone)]
pub struct InstanceStore {
    pool: SqlitePool,
}

impl InstanceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: &str) -> Result<Option<ServiceInstance>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM service_instances WHERE id = ?");
        sqlx::query_as::<_, InstanceRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(ServiceInstance::try_from)
            .transpose()
    }

    pub async fn get_all(&self) -> Result<BTreeMap<String, ServiceInstance>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM service_instances");
        let rows = sqlx::query_as::<_, InstanceRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| ServiceInstance::try_from(row).map(|i| (i.id.clone(), i)))
            .collect()
    }

    pub async fn get_all_by_type(
        &self,
        service_type: ServiceType,
    ) -> Result<BTreeMap<String, ServiceInstance>, StoreError> {
        let mut all = self.get_all().await?;
        all.retain(|_, instance| instance.service_type == service_type);
        Ok(all)
    }

    /// All instances sorted by display order, ties broken by id.
    pub async fn list_ordered(&self) -> Result<Vec<ServiceInstance>, StoreError> {
        let mut list: Vec<ServiceInstance> = self.get_all().await?.into_values().collect();
        list.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        Ok(list)
    }

    /// Upserts `instance` under `id` (full replace) and stamps `lastSaved`.
    pub async fn save(
        &self,
        id: &str,
        mut instance: ServiceInstance,
    ) -> Result<ServiceInstance, StoreError> {
        if id.trim().is_empty() {
            return Err(StoreError::Validation("instance id is required".into()));
        }
        if instance.display_name.trim().is_empty() {
            return Err(StoreError::Validation("displayName is required".into()));
        }
        instance.id = id.to_string();
        let now = Utc::now();
        instance.last_saved = Some(now);

        let c = &instance.credentials;
        sqlx::query(&format!(
            "INSERT OR REPLACE INTO service_instances ({COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&instance.id)
        .bind(instance.service_type.as_str())
        .bind(&instance.display_name)
        .bind(&instance.url)
        .bind(&c.api_key)
        .bind(&c.token)
        .bind(&c.username)
        .bind(&c.password)
        .bind(&c.api_key1)
        .bind(&c.api_key2)
        .bind(&c.api_key3)
        .bind(&c.api_key4)
        .bind(&c.api_key5)
        .bind(&c.site_manager_api_key)
        .bind(instance.enabled)
        .bind(instance.order)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(instance)
    }

    /// Removes the instance. Deleting an unknown id is not an error.
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM service_instances WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Smallest unused `<type><n>` id, starting at 1.
    pub async fn next_id(&self, service_type: ServiceType) -> Result<String, StoreError> {
        let existing = self.get_all().await?;
        let id = (1..)
            .map(|n| format!("{service_type}{n}"))
            .find(|candidate| !existing.contains_key(candidate))
            .unwrap_or_else(|| format!("{service_type}{}", existing.len() + 1));
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_db;
    use pretty_assertions::assert_eq;

    fn sonarr(display_name: &str) -> ServiceInstance {
        ServiceInstance {
            id: String::new(),
            service_type: ServiceType::Sonarr,
            display_name: display_name.into(),
            url: Some("http://sonarr:8989".into()),
            credentials: Credentials {
                api_key: Some("k".into()),
                ..Default::default()
            },
            enabled: true,
            order: 2,
            last_saved: None,
        }
    }

    #[tokio::test]
    async fn save_then_get_round_trips_with_fresh_stamp() {
        let store = InstanceStore::new(init_memory_db().await);
        let before = Utc::now();
        store.save("sonarr1", sonarr("Shows")).await.unwrap();

        let loaded = store.get("sonarr1").await.unwrap().unwrap();
        let stamp = loaded.last_saved.unwrap();
        assert!(stamp >= before);

        let mut expected = sonarr("Shows");
        expected.id = "sonarr1".into();
        expected.last_saved = Some(stamp);
        assert_eq!(loaded, expected);
    }

    #[tokio::test]
    async fn save_is_a_full_replace() {
        let store = InstanceStore::new(init_memory_db().await);
        store.save("sonarr1", sonarr("Shows")).await.unwrap();

        let mut replacement = sonarr("Renamed");
        replacement.credentials.api_key = None;
        store.save("sonarr1", replacement).await.unwrap();

        let loaded = store.get("sonarr1").await.unwrap().unwrap();
        assert_eq!(loaded.display_name, "Renamed");
        assert_eq!(loaded.credentials.api_key, None);
        assert_eq!(store.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn save_requires_display_name() {
        let store = InstanceStore::new(init_memory_db().await);
        let err = store.save("sonarr1", sonarr("  ")).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(store.get("sonarr1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = InstanceStore::new(init_memory_db().await);
        store.save("sonarr1", sonarr("Shows")).await.unwrap();
        store.save("sonarr2", sonarr("Anime")).await.unwrap();

        store.delete("sonarr1").await.unwrap();
        let after_first = store.get_all().await.unwrap();
        store.delete("sonarr1").await.unwrap();
        let after_second = store.get_all().await.unwrap();

        assert_eq!(after_first, after_second);
        assert_eq!(after_second.keys().collect::<Vec<_>>(), vec!["sonarr2"]);
    }

    #[tokio::test]
    async fn filters_by_type_and_orders_by_order_then_id() {
        let store = InstanceStore::new(init_memory_db().await);
        store.save("sonarr2", sonarr("B")).await.unwrap();
        store.save("sonarr1", sonarr("A")).await.unwrap();
        let mut plex = sonarr("Plex");
        plex.service_type = ServiceType::Plex;
        plex.order = 0;
        store.save("plex1", plex).await.unwrap();

        let sonarrs = store.get_all_by_type(ServiceType::Sonarr).await.unwrap();
        assert_eq!(sonarrs.len(), 2);

        let ids: Vec<String> = store
            .list_ordered()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec!["plex1", "sonarr1", "sonarr2"]);
    }

    #[tokio::test]
    async fn next_id_fills_the_first_gap() {
        let store = InstanceStore::new(init_memory_db().await);
        assert_eq!(store.next_id(ServiceType::Radarr).await.unwrap(), "radarr1");
        store.save("sonarr1", sonarr("A")).await.unwrap();
        store.save("sonarr3", sonarr("C")).await.unwrap();
        assert_eq!(store.next_id(ServiceType::Sonarr).await.unwrap(), "sonarr2");
    }
}
