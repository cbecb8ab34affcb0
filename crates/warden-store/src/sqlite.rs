use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteRow};
use sqlx::Row;
use tokio::sync::Mutex;
use uuid::Uuid;

use warden_types::{AuditEvent, DelegationContract, Result, WardenError};

use crate::filter::ContractFilter;
use crate::traits::{AuditLog, AuditQuery, ContractStore, seal_event};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS delegation_contracts (
    contract_id         TEXT PRIMARY KEY,
    delegator_agent_id  TEXT NOT NULL,
    delegatee_agent_id  TEXT NOT NULL,
    task_id             TEXT NOT NULL,
    task_description    TEXT NOT NULL,
    verification_policy TEXT NOT NULL,
    success_criteria    TEXT NOT NULL,
    timeout_ms          INTEGER NOT NULL,
    permission_tokens   TEXT,
    status              TEXT NOT NULL,
    created_at          TEXT NOT NULL,
    activated_at        TEXT,
    completed_at        TEXT,
    verification_result TEXT,
    parent_contract_id  TEXT,
    delegation_depth    INTEGER NOT NULL,
    tlp_classification  TEXT,
    contract_json       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_contracts_status ON delegation_contracts(status);
CREATE INDEX IF NOT EXISTS idx_contracts_delegatee ON delegation_contracts(delegatee_agent_id);
CREATE INDEX IF NOT EXISTS idx_contracts_parent ON delegation_contracts(parent_contract_id);

CREATE TABLE IF NOT EXISTS reputation_audit_log (
    event_id               TEXT PRIMARY KEY,
    event_type             TEXT NOT NULL,
    timestamp              TEXT NOT NULL,
    agent_id               TEXT NOT NULL,
    agent_name             TEXT NOT NULL,
    event_data             TEXT NOT NULL,
    delegation_contract_id TEXT,
    source_system          TEXT NOT NULL,
    previous_hash          TEXT,
    hash                   TEXT NOT NULL,
    seq                    INTEGER
);
CREATE INDEX IF NOT EXISTS idx_audit_agent ON reputation_audit_log(agent_id);
CREATE INDEX IF NOT EXISTS idx_audit_contract ON reputation_audit_log(delegation_contract_id);
"#;

fn backend_err(context: &str, err: impl std::fmt::Display) -> WardenError {
    WardenError::StorageUnavailable {
        reason: format!("{context}: {err}"),
    }
}

fn decode_err(context: &str, err: impl std::fmt::Display) -> WardenError {
    WardenError::StorageUnavailable {
        reason: format!("corrupt row ({context}): {err}"),
    }
}

/// SQLite-backed contract store using WAL journaling. The schema is
/// created idempotently on connect.
#[derive(Clone)]
pub struct SqliteContractStore {
    pool: Arc<SqlitePool>,
}

impl std::fmt::Debug for SqliteContractStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteContractStore").finish()
    }
}

impl SqliteContractStore {
    /// Connect (or create) the database at `database_url`, e.g.
    /// `sqlite://warden.db`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| backend_err("parse database url", e))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| backend_err("connect", e))?;
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| backend_err("create schema", e))?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub fn pool(&self) -> Arc<SqlitePool> {
        self.pool.clone()
    }

    fn row_to_contract(row: &SqliteRow) -> Result<DelegationContract> {
        let json: String = row
            .try_get("contract_json")
            .map_err(|e| decode_err("contract_json", e))?;
        serde_json::from_str(&json).map_err(|e| decode_err("contract_json", e))
    }

    async fn write(&self, contract: &DelegationContract, replace: bool) -> Result<()> {
        let json = serde_json::to_string(contract)
            .map_err(|e| backend_err("serialize contract", e))?;
        let verb = if replace {
            "INSERT OR REPLACE"
        } else {
            "INSERT"
        };
        let sql = format!(
            r#"
            {verb} INTO delegation_contracts (
                contract_id, delegator_agent_id, delegatee_agent_id,
                task_id, task_description, verification_policy,
                success_criteria, timeout_ms, permission_tokens, status,
                created_at, activated_at, completed_at, verification_result,
                parent_contract_id, delegation_depth, tlp_classification,
                contract_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            "#,
        );
        sqlx::query(&sql)
            .bind(contract.contract_id.to_string())
            .bind(contract.delegator.id.to_string())
            .bind(contract.delegatee.id.to_string())
            .bind(&contract.task_id)
            .bind(&contract.task_description)
            .bind(
                serde_json::to_string(&contract.verification_policy)
                    .map_err(|e| backend_err("serialize policy", e))?
                    .trim_matches('"')
                    .to_string(),
            )
            .bind(
                serde_json::to_string(&contract.success_criteria)
                    .map_err(|e| backend_err("serialize criteria", e))?,
            )
            .bind(contract.timeout_ms as i64)
            .bind(
                serde_json::to_string(&contract.permission_token)
                    .map_err(|e| backend_err("serialize token", e))?,
            )
            .bind(contract.status.as_str())
            .bind(contract.created_at.to_rfc3339())
            .bind(contract.activated_at.map(|t| t.to_rfc3339()))
            .bind(contract.completed_at.map(|t| t.to_rfc3339()))
            .bind(
                contract
                    .verification_result
                    .as_ref()
                    .map(|v| v.to_string()),
            )
            .bind(contract.parent_contract_id.map(|id| id.to_string()))
            .bind(contract.delegation_depth as i64)
            .bind(contract.tlp_classification.as_str())
            .bind(&json)
            .execute(self.pool.as_ref())
            .await
            .map_err(|e| backend_err("write contract", e))?;
        Ok(())
    }
}

#[async_trait]
impl ContractStore for SqliteContractStore {
    async fn insert(&self, contract: DelegationContract) -> Result<()> {
        if self.get(contract.contract_id).await?.is_some() {
            return Err(WardenError::invalid(format!(
                "contract {} already exists",
                contract.contract_id,
            )));
        }
        self.write(&contract, false).await
    }

    async fn get(&self, contract_id: Uuid) -> Result<Option<DelegationContract>> {
        let row = sqlx::query(
            "SELECT contract_json FROM delegation_contracts WHERE contract_id = ?1",
        )
        .bind(contract_id.to_string())
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| backend_err("read contract", e))?;
        row.as_ref().map(Self::row_to_contract).transpose()
    }

    async fn update(&self, contract: DelegationContract) -> Result<()> {
        if self.get(contract.contract_id).await?.is_none() {
            return Err(WardenError::not_found("contract", contract.contract_id));
        }
        self.write(&contract, true).await
    }

    async fn query(&self, filter: &ContractFilter) -> Result<Vec<DelegationContract>> {
        // Sorting and pagination share the in-memory filter so every backend
        // orders rows identically.
        let rows = sqlx::query("SELECT contract_json FROM delegation_contracts")
            .fetch_all(self.pool.as_ref())
            .await
            .map_err(|e| backend_err("query contracts", e))?;
        let contracts = rows
            .iter()
            .map(Self::row_to_contract)
            .collect::<Result<Vec<_>>>()?;
        Ok(filter.apply(contracts))
    }
}

/// SQLite-backed audit log sharing the contract store's pool. Appends are
/// serialized behind a mutex so the hash chain never forks.
#[derive(Clone)]
pub struct SqliteAuditLog {
    pool: Arc<SqlitePool>,
    append_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for SqliteAuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteAuditLog").finish()
    }
}

impl SqliteAuditLog {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self {
            pool,
            append_lock: Arc::new(Mutex::new(())),
        }
    }

    fn row_to_event(row: &SqliteRow) -> Result<AuditEvent> {
        let event_id: String = row.try_get("event_id").map_err(|e| decode_err("event_id", e))?;
        let event_type: String = row
            .try_get("event_type")
            .map_err(|e| decode_err("event_type", e))?;
        let timestamp: String = row
            .try_get("timestamp")
            .map_err(|e| decode_err("timestamp", e))?;
        let agent_id: String = row.try_get("agent_id").map_err(|e| decode_err("agent_id", e))?;
        let agent_name: String = row
            .try_get("agent_name")
            .map_err(|e| decode_err("agent_name", e))?;
        let event_data: String = row
            .try_get("event_data")
            .map_err(|e| decode_err("event_data", e))?;
        let contract_id: Option<String> = row
            .try_get("delegation_contract_id")
            .map_err(|e| decode_err("delegation_contract_id", e))?;
        let source_system: String = row
            .try_get("source_system")
            .map_err(|e| decode_err("source_system", e))?;
        let previous_hash: Option<String> = row
            .try_get("previous_hash")
            .map_err(|e| decode_err("previous_hash", e))?;
        let hash: String = row.try_get("hash").map_err(|e| decode_err("hash", e))?;

        Ok(AuditEvent {
            event_id: Uuid::parse_str(&event_id).map_err(|e| decode_err("event_id", e))?,
            event_type: serde_json::from_str(&format!("\"{event_type}\""))
                .map_err(|e| decode_err("event_type", e))?,
            timestamp: chrono::DateTime::parse_from_rfc3339(&timestamp)
                .map_err(|e| decode_err("timestamp", e))?
                .with_timezone(&chrono::Utc),
            agent_id: Uuid::parse_str(&agent_id).map_err(|e| decode_err("agent_id", e))?,
            agent_name,
            event_data: serde_json::from_str(&event_data)
                .map_err(|e| decode_err("event_data", e))?,
            delegation_contract_id: contract_id
                .map(|id| Uuid::parse_str(&id))
                .transpose()
                .map_err(|e| decode_err("delegation_contract_id", e))?,
            source_system,
            previous_hash,
            hash,
        })
    }
}

#[async_trait]
impl AuditLog for SqliteAuditLog {
    async fn append(&self, event: AuditEvent) -> Result<AuditEvent> {
        let _guard = self.append_lock.lock().await;
        let previous_hash = self.latest_hash().await?;
        let sealed = seal_event(event, previous_hash);

        sqlx::query(
            r#"
            INSERT INTO reputation_audit_log (
                event_id, event_type, timestamp, agent_id, agent_name,
                event_data, delegation_contract_id, source_system,
                previous_hash, hash, seq
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                (SELECT COALESCE(MAX(seq), 0) + 1 FROM reputation_audit_log)
            )
            "#,
        )
        .bind(sealed.event_id.to_string())
        .bind(sealed.event_type.as_str())
        .bind(sealed.timestamp.to_rfc3339())
        .bind(sealed.agent_id.to_string())
        .bind(&sealed.agent_name)
        .bind(sealed.event_data.to_string())
        .bind(sealed.delegation_contract_id.map(|id| id.to_string()))
        .bind(&sealed.source_system)
        .bind(sealed.previous_hash.as_deref())
        .bind(&sealed.hash)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| backend_err("append audit event", e))?;

        Ok(sealed)
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>> {
        let rows = sqlx::query("SELECT * FROM reputation_audit_log ORDER BY seq ASC")
            .fetch_all(self.pool.as_ref())
            .await
            .map_err(|e| backend_err("query audit log", e))?;
        let mut events = rows
            .iter()
            .map(Self::row_to_event)
            .collect::<Result<Vec<_>>>()?;
        events.retain(|e| {
            query.agent_id.is_none_or(|id| e.agent_id == id)
                && query.event_type.is_none_or(|kind| e.event_type == kind)
                && query
                    .contract_id
                    .is_none_or(|id| e.delegation_contract_id == Some(id))
        });
        if let Some(limit) = query.limit {
            events.truncate(limit);
        }
        Ok(events)
    }

    async fn latest_hash(&self) -> Result<Option<String>> {
        let row =
            sqlx::query("SELECT hash FROM reputation_audit_log ORDER BY seq DESC LIMIT 1")
                .fetch_optional(self.pool.as_ref())
                .await
                .map_err(|e| backend_err("read latest hash", e))?;
        row.map(|r| r.try_get::<String, _>("hash").map_err(|e| decode_err("hash", e)))
            .transpose()
    }

    async fn verify_integrity(&self) -> Result<bool> {
        let events = self.query(&AuditQuery::default()).await?;
        for (i, event) in events.iter().enumerate() {
            if i == 0 {
                if event.previous_hash.is_some() {
                    return Ok(false);
                }
            } else if event.previous_hash.as_ref() != Some(&events[i - 1].hash) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
