//! The fixed catalog of operations the model may request, and their dispatch.

use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use ordermate_core::domain::customer::{Customer, CustomerId, CustomerLookup};
use ordermate_core::domain::order::{LineItem, Order, OrderDelta, OrderId, QuantityUpdate};
use ordermate_core::errors::ApplicationError;
use ordermate_db::RecordStore;

use crate::llm::{ToolInvocation, ToolSpec};
use crate::locks::KeyedLocks;
use crate::orders::OrderService;
use crate::resolution::CustomerResolver;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolKind {
    CreateCustomer,
    PlaceOrder,
    ModifyOrder,
    UpdateCustomerAddress,
    GetOrderStatus,
}

impl ToolKind {
    pub const ALL: [ToolKind; 5] = [
        Self::CreateCustomer,
        Self::PlaceOrder,
        Self::ModifyOrder,
        Self::UpdateCustomerAddress,
        Self::GetOrderStatus,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::CreateCustomer => "create_customer",
            Self::PlaceOrder => "place_order",
            Self::ModifyOrder => "modify_order",
            Self::UpdateCustomerAddress => "update_customer_address",
            Self::GetOrderStatus => "get_order_status",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::CreateCustomer => {
                "Create or fetch a customer. Use when user wants to register/create account."
            }
            Self::PlaceOrder => {
                "Create a new order for a customer with item list and optional shipping address."
            }
            Self::ModifyOrder => {
                "Modify an existing order: add/remove/update items or change shipping address."
            }
            Self::UpdateCustomerAddress => "Update a customer's default address.",
            Self::GetOrderStatus => "Fetch the current status and details of an order.",
        }
    }

    /// JSON schema of the arguments object.
    pub fn parameters(self) -> Value {
        let line_item = |minimum: u32| {
            json!({
                "type": "object",
                "properties": {
                    "sku": {"type": "string"},
                    "quantity": {"type": "integer", "minimum": minimum}
                },
                "required": ["sku", "quantity"]
            })
        };

        match self {
            Self::CreateCustomer => json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "email": {"type": "string"},
                    "address": {"type": "string"}
                }
            }),
            Self::PlaceOrder => json!({
                "type": "object",
                "properties": {
                    "customer": {
                        "type": "object",
                        "description": "Customer identification info. Provide at least email or name.",
                        "properties": {
                            "id": {"type": "string"},
                            "name": {"type": "string"},
                            "email": {"type": "string"},
                            "address": {"type": "string"}
                        }
                    },
                    "items": {
                        "type": "array",
                        "items": line_item(1),
                        "minItems": 1
                    },
                    "shipping_address": {
                        "type": "string",
                        "description": "If omitted, uses customer's default address."
                    }
                },
                "required": ["items"]
            }),
            Self::ModifyOrder => json!({
                "type": "object",
                "properties": {
                    "order_id": {"type": "string"},
                    "add_items": {
                        "type": "array",
                        "items": line_item(1)
                    },
                    "remove_items": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "List of SKUs to remove entirely."
                    },
                    "update_quantities": {
                        "type": "array",
                        "items": line_item(0),
                        "description": "If quantity becomes 0, the item is removed."
                    },
                    "new_shipping_address": {"type": "string"}
                },
                "required": ["order_id"]
            }),
            Self::UpdateCustomerAddress => json!({
                "type": "object",
                "properties": {
                    "customer_id": {"type": "string"},
                    "new_address": {"type": "string"}
                },
                "required": ["customer_id", "new_address"]
            }),
            Self::GetOrderStatus => json!({
                "type": "object",
                "properties": {
                    "order_id": {"type": "string"}
                },
                "required": ["order_id"]
            }),
        }
    }

    pub fn spec(self) -> ToolSpec {
        ToolSpec { name: self.name(), description: self.description(), parameters: self.parameters() }
    }
}

pub fn catalog() -> Vec<ToolSpec> {
    ToolKind::ALL.into_iter().map(ToolKind::spec).collect()
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct CreateCustomerArgs {
    pub name: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct CustomerRef {
    pub id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PlaceOrderArgs {
    #[serde(default)]
    pub customer: Option<CustomerRef>,
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub shipping_address: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ModifyOrderArgs {
    pub order_id: String,
    #[serde(default)]
    pub add_items: Vec<LineItem>,
    #[serde(default)]
    pub remove_items: Vec<String>,
    #[serde(default)]
    pub update_quantities: Vec<QuantityUpdate>,
    #[serde(default)]
    pub new_shipping_address: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct UpdateCustomerAddressArgs {
    pub customer_id: String,
    pub new_address: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct GetOrderStatusArgs {
    pub order_id: String,
}

/// A decoded invocation. Every catalog entry has exactly one variant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolCall {
    CreateCustomer(CreateCustomerArgs),
    PlaceOrder(PlaceOrderArgs),
    ModifyOrder(ModifyOrderArgs),
    UpdateCustomerAddress(UpdateCustomerAddressArgs),
    GetOrderStatus(GetOrderStatusArgs),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Unknown tool {0}")]
    UnknownTool(String),
    #[error(transparent)]
    Application(#[from] ApplicationError),
}

impl ToolCall {
    pub fn decode(invocation: &ToolInvocation) -> Result<Self, DispatchError> {
        let kind = ToolKind::from_name(&invocation.name)
            .ok_or_else(|| DispatchError::UnknownTool(invocation.name.clone()))?;

        let raw = invocation.arguments.trim();
        let raw = if raw.is_empty() { "{}" } else { raw };

        let decoded = match kind {
            ToolKind::CreateCustomer => serde_json::from_str(raw).map(Self::CreateCustomer),
            ToolKind::PlaceOrder => serde_json::from_str(raw).map(Self::PlaceOrder),
            ToolKind::ModifyOrder => serde_json::from_str(raw).map(Self::ModifyOrder),
            ToolKind::UpdateCustomerAddress => {
                serde_json::from_str(raw).map(Self::UpdateCustomerAddress)
            }
            ToolKind::GetOrderStatus => serde_json::from_str(raw).map(Self::GetOrderStatus),
        };

        decoded.map_err(|error| {
            ApplicationError::ArgumentDecode {
                tool: kind.name().to_string(),
                message: error.to_string(),
            }
            .into()
        })
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            Self::CreateCustomer(_) => ToolKind::CreateCustomer,
            Self::PlaceOrder(_) => ToolKind::PlaceOrder,
            Self::ModifyOrder(_) => ToolKind::ModifyOrder,
            Self::UpdateCustomerAddress(_) => ToolKind::UpdateCustomerAddress,
            Self::GetOrderStatus(_) => ToolKind::GetOrderStatus,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ToolResult {
    Customer(Customer),
    Order(Order),
    Failed(String),
}

impl ToolResult {
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed(message) => Some(message),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Customer(customer) => json!({"ok": true, "customer": customer}),
            Self::Order(order) => json!({"ok": true, "order": order}),
            Self::Failed(message) => json!({"ok": false, "error": message}),
        }
    }

    /// Serialized form appended to the session log as the tool entry.
    pub fn to_content(&self) -> String {
        self.to_json().to_string()
    }
}

/// Executes decoded tool calls against the resolution and order engines.
#[derive(Clone)]
pub struct ToolRegistry {
    customers: CustomerResolver,
    orders: OrderService,
}

impl ToolRegistry {
    pub fn new(customers: CustomerResolver, orders: OrderService) -> Self {
        Self { customers, orders }
    }

    pub fn for_store(store: &RecordStore, locks: KeyedLocks) -> Self {
        Self::new(
            CustomerResolver::new(store.customers.clone(), locks.clone()),
            OrderService::new(store.orders.clone(), locks),
        )
    }

    pub fn catalog(&self) -> Vec<ToolSpec> {
        catalog()
    }

    pub fn customers(&self) -> &CustomerResolver {
        &self.customers
    }

    pub fn orders(&self) -> &OrderService {
        &self.orders
    }

    /// Runs one invocation. Failures of any kind become a failed result.
    pub async fn execute(&self, invocation: &ToolInvocation) -> ToolResult {
        match self.dispatch(invocation).await {
            Ok(result) => {
                info!(
                    event_name = "agent.tool.succeeded",
                    tool = %invocation.name,
                    correlation_id = %invocation.id,
                    "tool invocation succeeded"
                );
                result
            }
            Err(error) => {
                warn!(
                    event_name = "agent.tool.failed",
                    tool = %invocation.name,
                    correlation_id = %invocation.id,
                    error = %error,
                    "tool invocation failed"
                );
                ToolResult::Failed(error.to_string())
            }
        }
    }

    async fn dispatch(&self, invocation: &ToolInvocation) -> Result<ToolResult, DispatchError> {
        let result = match ToolCall::decode(invocation)? {
            ToolCall::CreateCustomer(args) => {
                let lookup = CustomerLookup::new(
                    args.name.as_deref(),
                    args.email.as_deref(),
                    args.address.as_deref(),
                );
                ToolResult::Customer(self.customers.resolve(&lookup).await?)
            }
            ToolCall::PlaceOrder(args) => {
                let reference = args.customer.unwrap_or_default();
                let customer_id =
                    reference.id.as_deref().map(str::trim).filter(|id| !id.is_empty());
                let customer = match customer_id {
                    Some(id) => self.customers.get(&CustomerId(id.to_string())).await?,
                    None => {
                        let lookup = CustomerLookup::new(
                            reference.name.as_deref(),
                            reference.email.as_deref(),
                            reference.address.as_deref(),
                        );
                        self.customers.resolve(&lookup).await?
                    }
                };
                let order = self
                    .orders
                    .create(&customer, &args.items, args.shipping_address.as_deref())
                    .await?;
                ToolResult::Order(order)
            }
            ToolCall::ModifyOrder(args) => {
                let delta = OrderDelta {
                    add_items: args.add_items,
                    remove_items: args.remove_items,
                    update_quantities: args.update_quantities,
                };
                let order = self
                    .orders
                    .apply_delta(
                        &OrderId(args.order_id),
                        &delta,
                        args.new_shipping_address.as_deref(),
                    )
                    .await?;
                ToolResult::Order(order)
            }
            ToolCall::UpdateCustomerAddress(args) => {
                let customer = self
                    .customers
                    .update_address(&CustomerId(args.customer_id), &args.new_address)
                    .await?;
                ToolResult::Customer(customer)
            }
            ToolCall::GetOrderStatus(args) => {
                ToolResult::Order(self.orders.get(&OrderId(args.order_id)).await?)
            }
        };

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use ordermate_core::errors::ApplicationError;
    use ordermate_db::RecordStore;

    use super::{catalog, DispatchError, ToolCall, ToolKind, ToolRegistry, ToolResult};
    use crate::llm::ToolInvocation;
    use crate::locks::KeyedLocks;

    fn invocation(name: &str, arguments: &str) -> ToolInvocation {
        ToolInvocation {
            id: format!("call_{name}"),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::for_store(&RecordStore::in_memory(), KeyedLocks::new())
    }

    #[test]
    fn catalog_lists_every_tool_once_with_required_fields() {
        let specs = catalog();
        let names: Vec<_> = specs.iter().map(|spec| spec.name).collect();

        assert_eq!(
            names,
            vec![
                "create_customer",
                "place_order",
                "modify_order",
                "update_customer_address",
                "get_order_status"
            ]
        );
        assert_eq!(specs[1].parameters["required"], json!(["items"]));
        assert_eq!(specs[1].parameters["properties"]["items"]["minItems"], 1);
        assert_eq!(specs[2].parameters["required"], json!(["order_id"]));
        assert_eq!(
            specs[2].parameters["properties"]["update_quantities"]["items"]["properties"]["quantity"]
                ["minimum"],
            0
        );
        assert_eq!(specs[3].parameters["required"], json!(["customer_id", "new_address"]));
        assert!(specs[0].parameters.get("required").is_none());
    }

    #[test]
    fn unknown_tool_is_reported_by_name() {
        let error = ToolCall::decode(&invocation("cancel_order", "{}")).expect_err("unknown");
        assert_eq!(error, DispatchError::UnknownTool("cancel_order".to_string()));
        assert_eq!(error.to_string(), "Unknown tool cancel_order");
    }

    #[test]
    fn malformed_arguments_become_argument_decode_errors() {
        let error =
            ToolCall::decode(&invocation("modify_order", "{not json")).expect_err("malformed");
        assert!(matches!(
            error,
            DispatchError::Application(ApplicationError::ArgumentDecode { ref tool, .. })
                if tool == "modify_order"
        ));

        let wrong_shape = ToolCall::decode(&invocation("get_order_status", r#"{"order_id": 7}"#))
            .expect_err("wrong shape");
        assert!(wrong_shape.to_string().starts_with("invalid arguments for `get_order_status`"));
    }

    #[test]
    fn empty_argument_text_is_read_as_an_empty_object() {
        let call = ToolCall::decode(&invocation("create_customer", "")).expect("decode");
        assert_eq!(call.kind(), ToolKind::CreateCustomer);
    }

    #[tokio::test]
    async fn place_order_resolves_customer_and_defaults_address() {
        let registry = registry();

        let result = registry
            .execute(&invocation(
                "place_order",
                r#"{"customer":{"name":"Alice","email":"A@x.com","address":"1 Orchard Rd"},
                    "items":[{"sku":"007","quantity":2}]}"#,
            ))
            .await;

        let value = result.to_json();
        assert_eq!(value["ok"], true);
        assert_eq!(value["order"]["status"], "PLACED");
        assert_eq!(value["order"]["shipping_address"], "1 Orchard Rd");
        assert_eq!(value["order"]["items"], json!([{"sku": "007", "quantity": 2}]));
    }

    #[tokio::test]
    async fn place_order_with_unknown_customer_id_fails() {
        let registry = registry();

        let result = registry
            .execute(&invocation(
                "place_order",
                r#"{"customer":{"id":"nope"},"items":[{"sku":"007","quantity":1}]}"#,
            ))
            .await;

        assert_eq!(result, ToolResult::Failed("customer `nope` not found".to_string()));
    }

    #[tokio::test]
    async fn place_order_without_identity_fails_resolution() {
        let result = registry()
            .execute(&invocation("place_order", r#"{"items":[{"sku":"007","quantity":1}]}"#))
            .await;

        assert_eq!(
            result.error(),
            Some("cannot resolve customer; provide at least name or email")
        );
    }

    #[tokio::test]
    async fn update_address_and_status_round_through_the_registry() {
        let registry = registry();
        let created = registry
            .execute(&invocation("create_customer", r#"{"name":"Bob","email":"b@x.com"}"#))
            .await;
        let customer_id = created.to_json()["customer"]["id"].as_str().unwrap_or_default().to_string();

        let updated = registry
            .execute(&invocation(
                "update_customer_address",
                &json!({"customer_id": customer_id, "new_address": "2 Bras Basah"}).to_string(),
            ))
            .await;
        assert_eq!(updated.to_json()["customer"]["address"], "2 Bras Basah");

        let placed = registry
            .execute(&invocation(
                "place_order",
                &json!({"customer": {"id": customer_id}, "items": [{"sku": "008", "quantity": 3}]})
                    .to_string(),
            ))
            .await;
        let order_id = placed.to_json()["order"]["id"].as_str().unwrap_or_default().to_string();

        let status = registry
            .execute(&invocation("get_order_status", &json!({"order_id": order_id}).to_string()))
            .await;
        let value = status.to_json();
        assert_eq!(value["order"]["shipping_address"], "2 Bras Basah");
        assert_eq!(value["order"]["customer_id"], customer_id.as_str());
        assert!(value["order"]["created_at"].is_string());
    }

    #[tokio::test]
    async fn failed_result_serializes_with_ok_false() {
        let result = registry().execute(&invocation("launch_rocket", "{}")).await;

        assert!(!result.is_ok());
        assert_eq!(result.to_json(), json!({"ok": false, "error": "Unknown tool launch_rocket"}));
    }
}
