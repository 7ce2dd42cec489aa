use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::error::RpcError;
use crate::request::RequestParams;
use crate::schema::{Schema, SchemaError};
use crate::types::RequestId;

/// Per-instance mapping from method name to its expected param and result
/// shapes, plus the live mapping from outstanding request id to the method
/// that produced it.
///
/// The method set is closed at construction time; `update_methods` is the
/// only sanctioned way to change it afterwards. Never shared between peers.
#[derive(Debug)]
pub struct TypeRegistry {
    methods: HashSet<String>,
    params: HashMap<String, Schema>,
    results: HashMap<String, Schema>,
    pending: Mutex<HashMap<RequestId, String>>,
}

impl TypeRegistry {
    pub fn new(
        methods: HashSet<String>,
        params: HashMap<String, Schema>,
        results: HashMap<String, Schema>,
    ) -> Self {
        let mut registry = Self {
            methods: HashSet::new(),
            params: HashMap::new(),
            results: HashMap::new(),
            pending: Mutex::new(HashMap::new()),
        };
        for method in methods {
            let params = params.get(&method).cloned().unwrap_or(Schema::None);
            let result = results.get(&method).cloned().unwrap_or(Schema::Any);
            registry.register(method, params, result);
        }
        registry
    }

    /// Register a method with its schemas. Idempotent overwrite.
    pub fn register(&mut self, method: String, params: Schema, result: Schema) {
        self.methods.insert(method.clone());
        self.params.insert(method.clone(), params);
        self.results.insert(method, result);
    }

    pub fn contains(&self, method: &str) -> bool {
        self.methods.contains(method)
    }

    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.methods.iter().map(String::as_str)
    }

    /// Validate `params` against the schema registered for `method`.
    ///
    /// Methods registered without a params schema take "no parameters":
    /// anything supplied is a mismatch.
    pub fn validate_params(
        &self,
        method: &str,
        params: Option<&RequestParams>,
    ) -> Result<(), SchemaError> {
        let value = params
            .map(RequestParams::to_value)
            .unwrap_or(serde_json::Value::Null);
        match self.params.get(method) {
            Some(schema) => schema.validate(&value),
            None => Schema::None.validate(&value),
        }
    }

    /// Validate a `result` value against the schema registered for `method`.
    ///
    /// Methods registered without a result schema take "no constraint".
    pub fn validate_result(
        &self,
        method: &str,
        result: &serde_json::Value,
    ) -> Result<(), SchemaError> {
        match self.results.get(method) {
            Some(schema) => schema.validate(result),
            None => Ok(()),
        }
    }

    /// Remember which method an outstanding request id belongs to, so the
    /// eventual response can be validated against that method's result type.
    pub fn set_pending(&self, id: RequestId, method: String) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, method);
    }

    /// Resolve an outstanding id back to its method, removing the entry.
    pub fn resolve_pending(&self, id: &RequestId) -> Option<String> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
    }

    pub fn clear_pending(&self, id: &RequestId) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
    }

    /// Replace the recognized method set.
    ///
    /// Methods already registered keep their schemas; new methods get the
    /// defaults. Refuses while any outstanding request still references a
    /// method that would be removed.
    pub fn update_methods(&mut self, new_methods: HashSet<String>) -> Result<(), RpcError> {
        let still_pending: Vec<String> = {
            let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            let mut methods: Vec<String> = pending
                .values()
                .filter(|method| !new_methods.contains(*method))
                .cloned()
                .collect();
            methods.sort();
            methods.dedup();
            methods
        };
        if !still_pending.is_empty() {
            return Err(RpcError::MethodsStillPending(still_pending));
        }

        self.methods.retain(|method| new_methods.contains(method));
        self.params.retain(|method, _| new_methods.contains(method));
        self.results.retain(|method, _| new_methods.contains(method));
        for method in new_methods {
            if !self.methods.contains(&method) {
                self.register(method, Schema::None, Schema::Any);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> TypeRegistry {
        let methods: HashSet<String> = ["add", "ping"].iter().map(|s| s.to_string()).collect();
        let params = HashMap::from([("add".to_string(), Schema::list(Schema::Number))]);
        let results = HashMap::from([
            ("add".to_string(), Schema::Number),
            ("ping".to_string(), Schema::String),
        ]);
        TypeRegistry::new(methods, params, results)
    }

    #[test]
    fn test_params_default_to_none() {
        let registry = registry();
        // "ping" has no params schema: absent params pass, any value fails
        assert!(registry.validate_params("ping", None).is_ok());
        let params = RequestParams::Array(vec![json!(1)]);
        assert!(registry.validate_params("ping", Some(&params)).is_err());
    }

    #[test]
    fn test_registered_params_schema_enforced() {
        let registry = registry();
        let good = RequestParams::Array(vec![json!(1), json!(2.5)]);
        let bad = RequestParams::Array(vec![json!("x")]);
        assert!(registry.validate_params("add", Some(&good)).is_ok());
        assert!(registry.validate_params("add", Some(&bad)).is_err());
        assert!(registry.validate_params("add", None).is_err());
    }

    #[test]
    fn test_result_validation() {
        let registry = registry();
        assert!(registry.validate_result("add", &json!(6)).is_ok());
        assert!(registry.validate_result("add", &json!("six")).is_err());
    }

    #[test]
    fn test_pending_round_trip() {
        let registry = registry();
        let id = RequestId::String("r1".into());
        registry.set_pending(id.clone(), "add".to_string());
        assert_eq!(registry.resolve_pending(&id), Some("add".to_string()));
        assert_eq!(registry.resolve_pending(&id), None);
    }

    #[test]
    fn test_update_methods_refuses_while_pending() {
        let mut registry = registry();
        registry.set_pending(RequestId::Number(1), "add".to_string());

        let only_ping: HashSet<String> = ["ping".to_string()].into_iter().collect();
        match registry.update_methods(only_ping.clone()) {
            Err(RpcError::MethodsStillPending(methods)) => {
                assert_eq!(methods, vec!["add".to_string()]);
            }
            other => panic!("expected MethodsStillPending, got {:?}", other),
        }

        registry.clear_pending(&RequestId::Number(1));
        registry.update_methods(only_ping).unwrap();
        assert!(!registry.contains("add"));
        assert!(registry.contains("ping"));
    }

    #[test]
    fn test_update_methods_keeps_schemas_of_retained_methods() {
        let mut registry = registry();
        let both: HashSet<String> = ["add".to_string(), "echo".to_string()].into_iter().collect();
        registry.update_methods(both).unwrap();

        // "add" kept its list schema, "echo" got the defaults
        let bad = RequestParams::Array(vec![json!("x")]);
        assert!(registry.validate_params("add", Some(&bad)).is_err());
        assert!(registry.validate_params("echo", None).is_ok());
        assert!(registry.validate_result("echo", &json!({"anything": true})).is_ok());
    }
}
