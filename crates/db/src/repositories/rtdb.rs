//! Firebase Realtime Database backend over the REST API.
//!
//! Each collection lives under `<base>/<collection>`; a record is the JSON
//! document at `<base>/<collection>/<id>.json`. The database enforces no
//! uniqueness, so duplicate prevention is left to the caller.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::instrument;

use ordermate_core::domain::customer::{Customer, CustomerId};
use ordermate_core::domain::order::{Order, OrderId};

use super::{CustomerRepository, OrderRepository, RepositoryError};

const CUSTOMERS: &str = "customers";
const ORDERS: &str = "orders";

#[derive(Clone)]
pub struct RtdbClient {
    inner: Arc<RtdbClientInner>,
}

struct RtdbClientInner {
    http: reqwest::Client,
    base_url: String,
    auth: Option<SecretString>,
}

impl std::fmt::Debug for RtdbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtdbClient")
            .field("base_url", &self.inner.base_url)
            .field("auth", &self.inner.auth.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl RtdbClient {
    pub fn new(
        base_url: &str,
        auth: Option<SecretString>,
        timeout_secs: u64,
    ) -> Result<Self, RepositoryError> {
        let http =
            reqwest::Client::builder().timeout(Duration::from_secs(timeout_secs.max(1))).build()?;

        Ok(Self {
            inner: Arc::new(RtdbClientInner {
                http,
                base_url: base_url.trim().trim_end_matches('/').to_string(),
                auth,
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}.json", self.inner.base_url, path);
        let builder = self.inner.http.request(method, url);
        match &self.inner.auth {
            Some(auth) => builder.query(&[("auth", auth.expose_secret())]),
            None => builder,
        }
    }

    async fn get(&self, path: &str) -> Result<Value, RepositoryError> {
        let response = self.request(Method::GET, path).send().await?.error_for_status()?;
        Ok(response.json::<Value>().await?)
    }

    async fn put<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<(), RepositoryError> {
        self.request(Method::PUT, path).json(body).send().await?.error_for_status()?;
        Ok(())
    }

    async fn patch(&self, path: &str, body: &Value) -> Result<(), RepositoryError> {
        self.request(Method::PATCH, path).json(body).send().await?.error_for_status()?;
        Ok(())
    }

    /// Server-side `orderBy`/`equalTo` query. A 400 response usually means the
    /// child is not indexed (`.indexOn` missing in the database rules).
    async fn query_equal(
        &self,
        collection: &str,
        child: &str,
        value: &str,
    ) -> Result<Value, RepositoryError> {
        let order_by = serde_json::to_string(child)?;
        let equal_to = serde_json::to_string(value)?;
        let response = self
            .request(Method::GET, collection)
            .query(&[("orderBy", order_by.as_str()), ("equalTo", equal_to.as_str())])
            .send()
            .await?;

        if response.status() == StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            return Err(RepositoryError::QueryUnsupported(body));
        }

        Ok(response.error_for_status()?.json::<Value>().await?)
    }

    /// Cheap connectivity probe against the database root.
    #[instrument(skip(self), fields(base_url = %self.inner.base_url))]
    pub async fn ping(&self) -> Result<(), RepositoryError> {
        self.request(Method::GET, "")
            .query(&[("shallow", "true")])
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Decodes a single document, filling `id` from its key when the stored
/// document does not carry one.
fn decode_document<T: DeserializeOwned>(id: &str, value: Value) -> Result<Option<T>, RepositoryError> {
    match value {
        Value::Null => Ok(None),
        Value::Object(mut fields) => {
            fields.entry("id").or_insert_with(|| Value::String(id.to_string()));
            Ok(Some(serde_json::from_value(Value::Object(fields))?))
        }
        other => Err(RepositoryError::Decode(format!(
            "expected an object at `{id}`, found `{other}`"
        ))),
    }
}

/// Decodes a keyed collection snapshot (`{id: doc, ...}`), skipping `null`.
fn decode_collection<T: DeserializeOwned>(value: Value) -> Result<Vec<T>, RepositoryError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Object(entries) => {
            let ordered: BTreeMap<String, Value> = entries.into_iter().collect();
            let mut documents = Vec::with_capacity(ordered.len());
            for (id, document) in ordered {
                if let Some(decoded) = decode_document(&id, document)? {
                    documents.push(decoded);
                }
            }
            Ok(documents)
        }
        other => Err(RepositoryError::Decode(format!("expected a keyed collection, found `{other}`"))),
    }
}

#[derive(Clone, Debug)]
pub struct RtdbCustomerRepository {
    client: RtdbClient,
}

impl RtdbCustomerRepository {
    pub fn new(client: RtdbClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl CustomerRepository for RtdbCustomerRepository {
    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, RepositoryError> {
        let value = self.client.get(&format!("{CUSTOMERS}/{}", id.0)).await?;
        decode_document(&id.0, value)
    }

    async fn query_by_email(&self, email: &str) -> Result<Option<Customer>, RepositoryError> {
        let value = self.client.query_equal(CUSTOMERS, "email", email).await?;
        let matches: Vec<Customer> = decode_collection(value)?;
        Ok(matches.into_iter().next())
    }

    async fn list(&self) -> Result<Vec<Customer>, RepositoryError> {
        let value = self.client.get(CUSTOMERS).await?;
        decode_collection(value)
    }

    async fn insert(&self, customer: Customer) -> Result<(), RepositoryError> {
        self.client.put(&format!("{CUSTOMERS}/{}", customer.id.0), &customer).await
    }

    async fn update_address(
        &self,
        id: &CustomerId,
        address: &str,
    ) -> Result<Option<Customer>, RepositoryError> {
        if self.find_by_id(id).await?.is_none() {
            return Ok(None);
        }

        self.client.patch(&format!("{CUSTOMERS}/{}", id.0), &json!({ "address": address })).await?;
        self.find_by_id(id).await
    }
}

#[derive(Clone, Debug)]
pub struct RtdbOrderRepository {
    client: RtdbClient,
}

impl RtdbOrderRepository {
    pub fn new(client: RtdbClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl OrderRepository for RtdbOrderRepository {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let value = self.client.get(&format!("{ORDERS}/{}", id.0)).await?;
        decode_document(&id.0, value)
    }

    async fn insert(&self, order: Order) -> Result<(), RepositoryError> {
        self.client.put(&format!("{ORDERS}/{}", order.id.0), &order).await
    }

    async fn save(&self, order: &Order) -> Result<(), RepositoryError> {
        let patch = json!({
            "items": serde_json::to_value(&order.items)?,
            "shipping_address": order.shipping_address,
        });
        self.client.patch(&format!("{ORDERS}/{}", order.id.0), &patch).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Arc;

    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use tokio::sync::Mutex;

    use ordermate_core::domain::customer::{Customer, CustomerId, CustomerLookup};
    use ordermate_core::domain::order::{ItemMap, LineItem, Order};

    use super::{RtdbClient, RtdbCustomerRepository, RtdbOrderRepository};
    use crate::repositories::{CustomerRepository, OrderRepository};

    /// Minimal stand-in for the RTDB REST surface. Documents are kept per
    /// collection; `orderBy` queries answer 400 unless `indexed` is set.
    #[derive(Clone, Default)]
    struct FakeRtdb {
        collections: Arc<Mutex<HashMap<String, BTreeMap<String, Value>>>>,
        indexed: bool,
        queries: Arc<Mutex<usize>>,
    }

    fn strip_json(segment: &str) -> String {
        segment.trim_end_matches(".json").to_string()
    }

    async fn get_collection(
        State(db): State<FakeRtdb>,
        Path(collection): Path<String>,
        Query(params): Query<HashMap<String, String>>,
    ) -> (StatusCode, Json<Value>) {
        let collection = strip_json(&collection);
        let collections = db.collections.lock().await;
        let documents = collections.get(&collection).cloned().unwrap_or_default();

        if let Some(equal_to) = params.get("equalTo") {
            *db.queries.lock().await += 1;
            if !db.indexed {
                return (StatusCode::BAD_REQUEST, Json(json!({"error": "Index not defined"})));
            }
            let wanted: String = serde_json::from_str(equal_to).unwrap_or_default();
            let matching: serde_json::Map<String, Value> = documents
                .into_iter()
                .filter(|(_, doc)| doc.get("email").and_then(Value::as_str) == Some(wanted.as_str()))
                .collect();
            return (StatusCode::OK, Json(Value::Object(matching)));
        }

        if documents.is_empty() {
            return (StatusCode::OK, Json(Value::Null));
        }
        (StatusCode::OK, Json(Value::Object(documents.into_iter().collect())))
    }

    async fn get_document(
        State(db): State<FakeRtdb>,
        Path((collection, id)): Path<(String, String)>,
    ) -> Json<Value> {
        let collections = db.collections.lock().await;
        let document = collections
            .get(&collection)
            .and_then(|documents| documents.get(&strip_json(&id)))
            .cloned()
            .unwrap_or(Value::Null);
        Json(document)
    }

    async fn put_document(
        State(db): State<FakeRtdb>,
        Path((collection, id)): Path<(String, String)>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        let mut collections = db.collections.lock().await;
        collections.entry(collection).or_default().insert(strip_json(&id), body.clone());
        Json(body)
    }

    async fn patch_document(
        State(db): State<FakeRtdb>,
        Path((collection, id)): Path<(String, String)>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        let mut collections = db.collections.lock().await;
        let document =
            collections.entry(collection).or_default().entry(strip_json(&id)).or_insert(json!({}));
        if let (Some(target), Some(fields)) = (document.as_object_mut(), body.as_object()) {
            for (key, value) in fields {
                target.insert(key.clone(), value.clone());
            }
        }
        Json(body)
    }

    async fn spawn(db: FakeRtdb) -> RtdbClient {
        let app = Router::new()
            .route("/{collection}", get(get_collection))
            .route(
                "/{collection}/{id}",
                get(get_document).put(put_document).patch(patch_document),
            )
            .with_state(db);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        RtdbClient::new(&format!("http://{address}/"), None, 5).expect("client")
    }

    #[tokio::test]
    async fn customer_round_trip_and_scan_fallback_without_index() {
        let db = FakeRtdb::default();
        let repo = RtdbCustomerRepository::new(spawn(db.clone()).await);
        let alice = Customer::from_lookup(&CustomerLookup::new(
            Some("Alice"),
            Some("a@x.com"),
            Some("1 Orchard Rd"),
        ));

        repo.insert(alice.clone()).await.expect("insert");

        assert_eq!(repo.find_by_id(&alice.id).await.expect("by id"), Some(alice.clone()));
        assert_eq!(repo.find_by_email("A@X.com").await.expect("by email"), Some(alice.clone()));
        assert_eq!(*db.queries.lock().await, 1, "indexed query should be attempted first");
        assert!(repo.find_by_id(&CustomerId("missing".into())).await.expect("missing").is_none());
    }

    #[tokio::test]
    async fn indexed_query_is_used_when_available() {
        let db = FakeRtdb { indexed: true, ..FakeRtdb::default() };
        let repo = RtdbCustomerRepository::new(spawn(db.clone()).await);
        let bob = Customer::from_lookup(&CustomerLookup::new(Some("Bob"), Some("b@x.com"), None));
        repo.insert(bob.clone()).await.expect("insert");

        let found = repo.query_by_email("b@x.com").await.expect("query");
        assert_eq!(found, Some(bob));
    }

    #[tokio::test]
    async fn documents_without_id_take_their_key() {
        let db = FakeRtdb::default();
        db.collections.lock().await.entry("customers".to_string()).or_default().insert(
            "legacy-1".to_string(),
            json!({"name": "Legacy", "email": "legacy@x.com"}),
        );
        let repo = RtdbCustomerRepository::new(spawn(db).await);

        let customers = repo.list().await.expect("list");
        assert_eq!(customers.len(), 1);
        assert_eq!(customers[0].id, CustomerId("legacy-1".to_string()));
        assert_eq!(customers[0].address, "");
    }

    #[tokio::test]
    async fn update_address_patches_only_the_address() {
        let db = FakeRtdb::default();
        let repo = RtdbCustomerRepository::new(spawn(db).await);
        let alice =
            Customer::from_lookup(&CustomerLookup::new(Some("Alice"), Some("a@x.com"), None));
        repo.insert(alice.clone()).await.expect("insert");

        let updated = repo
            .update_address(&alice.id, "9 Changi Rd")
            .await
            .expect("update")
            .expect("customer exists");
        assert_eq!(updated.address, "9 Changi Rd");
        assert_eq!(updated.email, "a@x.com");
        assert!(repo
            .update_address(&CustomerId("missing".into()), "x")
            .await
            .expect("missing")
            .is_none());
    }

    #[tokio::test]
    async fn order_save_patches_items_and_address() {
        let db = FakeRtdb::default();
        let repo = RtdbOrderRepository::new(spawn(db).await);
        let items = ItemMap::from_requested(&[LineItem { sku: "007".into(), quantity: 2 }])
            .expect("items");
        let mut order = Order::place(CustomerId("c-1".into()), items, "1 Orchard Rd".into());
        repo.insert(order.clone()).await.expect("insert");

        order.items = ItemMap::from_requested(&[LineItem { sku: "008".into(), quantity: 1 }])
            .expect("items");
        order.shipping_address = "9 Changi Rd".into();
        repo.save(&order).await.expect("save");

        let stored = repo.find_by_id(&order.id).await.expect("find").expect("exists");
        assert_eq!(stored.items, order.items);
        assert_eq!(stored.shipping_address, "9 Changi Rd");
        assert_eq!(stored.customer_id, order.customer_id);
    }
}
