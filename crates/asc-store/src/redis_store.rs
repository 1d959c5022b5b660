//! Redis-backed `Store`.

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::{Result, Store};

pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn set(&self, key: &str, value: &str, ttl_sec: Option<u64>) -> Result<()> {
        let mut conn = self.conn.clone();
        match ttl_sec {
            Some(ttl) => {
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("EX")
                    .arg(ttl)
                    .query_async::<()>(&mut conn)
                    .await?
            }
            None => {
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .query_async::<()>(&mut conn)
                    .await?
            }
        };
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl_sec: Option<u64>) -> Result<bool> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if let Some(ttl) = ttl_sec {
            cmd.arg("EX").arg(ttl);
        }
        let result: Option<String> = cmd.query_async(&mut conn).await?;
        Ok(result.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let result: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(result)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let result: Vec<Option<String>> =
            redis::cmd("MGET").arg(keys).query_async(&mut conn).await?;
        Ok(result)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(deleted > 0)
    }

    async fn scan_match(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await?;

            keys.extend(batch);
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(keys)
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        let value: i64 = redis::cmd("INCR").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl_sec: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl_sec)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}
