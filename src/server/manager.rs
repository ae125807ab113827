//! Database Manager
//!
//! Holds the configured number of databases; SELECT switches a connection's
//! current index. Cluster mode runs with a single database.

use crate::storage::Db;

#[derive(Debug)]
pub struct DbManager {
    dbs: Vec<Db>,
}

impl DbManager {
    pub fn new(databases: usize, shard_num: usize) -> Self {
        let databases = databases.max(1);
        let dbs = (0..databases).map(|_| Db::new(shard_num)).collect();
        Self { dbs }
    }

    /// Out-of-range indices fall back to database 0; SELECT bounds-checks
    /// before ever handing an index here.
    pub fn db(&self, index: usize) -> &Db {
        self.dbs.get(index).unwrap_or(&self.dbs[0])
    }

    pub fn len(&self) -> usize {
        self.dbs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dbs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Value;
    use bytes::Bytes;

    #[test]
    fn test_databases_are_independent() {
        let manager = DbManager::new(2, 16);
        manager
            .db(0)
            .data()
            .set("k", Value::Str(Bytes::from_static(b"zero")));
        assert!(manager.db(1).data().get("k").is_none());
        assert!(manager.db(0).data().get("k").is_some());
    }

    #[test]
    fn test_at_least_one_database() {
        let manager = DbManager::new(0, 16);
        assert_eq!(manager.len(), 1);
    }
}
