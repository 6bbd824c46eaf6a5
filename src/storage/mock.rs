use super::{SignedUrlOptions, StorageBackend};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// In-memory backend with failure injection, used to exercise the fallback
/// gateway. `fail_all` makes every call error; `fail_exists` makes only the
/// existence check itself throw.
#[derive(Clone)]
pub struct MockBackend {
    name: String,
    objects: Arc<Mutex<HashMap<String, (Vec<u8>, String)>>>,
    fail_all: Arc<Mutex<bool>>,
    fail_exists: Arc<Mutex<bool>>,
    put_count: Arc<Mutex<usize>>,
    exists_count: Arc<Mutex<usize>>,
    signed_url_count: Arc<Mutex<usize>>,
}

impl MockBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            objects: Arc::new(Mutex::new(HashMap::new())),
            fail_all: Arc::new(Mutex::new(false)),
            fail_exists: Arc::new(Mutex::new(false)),
            put_count: Arc::new(Mutex::new(0)),
            exists_count: Arc::new(Mutex::new(0)),
            signed_url_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn failing(name: &str) -> Self {
        let backend = Self::new(name);
        *backend.fail_all.lock().unwrap() = true;
        backend
    }

    pub fn with_object(self, key: &str, bytes: Vec<u8>, content_type: &str) -> Self {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (bytes, content_type.to_string()));
        self
    }

    pub fn with_failing_exists(self) -> Self {
        *self.fail_exists.lock().unwrap() = true;
        self
    }

    pub fn set_failing(&self, failing: bool) {
        *self.fail_all.lock().unwrap() = failing;
    }

    pub fn get_put_count(&self) -> usize {
        *self.put_count.lock().unwrap()
    }

    pub fn get_exists_count(&self) -> usize {
        *self.exists_count.lock().unwrap()
    }

    pub fn get_signed_url_count(&self) -> usize {
        *self.signed_url_count.lock().unwrap()
    }

    pub fn get_object(&self, key: &str) -> Option<(Vec<u8>, String)> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    fn check_failure(&self, operation: &str) -> Result<()> {
        if *self.fail_all.lock().unwrap() {
            return Err(Error::Internal(format!(
                "{} backend down during {}",
                self.name, operation
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        _metadata: Option<&HashMap<String, String>>,
    ) -> Result<()> {
        *self.put_count.lock().unwrap() += 1;
        self.check_failure("put")?;
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (bytes.to_vec(), content_type.to_string()));
        Ok(())
    }

    async fn get_signed_url(&self, key: &str, _options: &SignedUrlOptions) -> Result<String> {
        *self.signed_url_count.lock().unwrap() += 1;
        self.check_failure("get_signed_url")?;
        Ok(format!("https://{}.mock/{}?signature=stub", self.name, key))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        *self.exists_count.lock().unwrap() += 1;
        self.check_failure("exists")?;
        if *self.fail_exists.lock().unwrap() {
            return Err(Error::Internal(format!(
                "{} backend cannot answer exists",
                self.name
            )));
        }
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        self.check_failure("copy")?;
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get(src)
            .cloned()
            .ok_or_else(|| Error::Internal(format!("{}: no such object {}", self.name, src)))?;
        objects.insert(dst.to_string(), object);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check_failure("delete")?;
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}
