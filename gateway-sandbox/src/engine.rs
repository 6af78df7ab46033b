// gateway-sandbox/src/engine.rs
// ============================================================================
// Module: QuickJS Sandbox Engine
// Description: C5 — sandboxed script execution for transform/condition/scheduling.
// Purpose: Run user-authored scripts against a fixed helper surface with no I/O.
// Dependencies: gateway-core, rquickjs
// ============================================================================

//! ## Overview
//! [`QuickJsSandbox`] implements `gateway_core::interfaces::Sandbox` over
//! `rquickjs`. Every invocation gets a fresh `Context` inside the shared
//! `Runtime`, a read-only `payload`/`context` binding injected as a JSON
//! prelude, and the fixed helper surface named in spec.md §4.5: `lookup`,
//! `parseDate`, `now`, `addMinutes/Hours/Days`, `subtractMinutes/Hours/Days`,
//! `toTimestamp`, `datetime`, `epoch`. No filesystem, network, or dynamic
//! evaluation is ever bound into the global scope, so scripts cannot reach
//! outside the sandbox by construction rather than by a denylist.
//!
//! Access to the single `Runtime` is serialized behind a mutex: QuickJS
//! contexts are not safe to drive from multiple threads at once, and the
//! surface this protects (per spec.md §5) is already "strictly
//! single-threaded per script".

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;

use gateway_core::core::LookupTable;
use gateway_core::core::Timestamp;
use gateway_core::core::UnmappedBehavior;
use gateway_core::core::lookup::resolve_hierarchical;
use gateway_core::interfaces::Sandbox;
use gateway_core::interfaces::SandboxContext;
use gateway_core::interfaces::SandboxError;
use rquickjs::Context;
use rquickjs::Ctx;
use rquickjs::Function;
use rquickjs::Object;
use rquickjs::Runtime;
use rquickjs::Value as JsValue;
use serde_json::Value;
use thiserror::Error;

use crate::timeout::TimeoutTicker;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised constructing a [`QuickJsSandbox`].
#[derive(Debug, Error)]
pub enum SandboxInitError {
    /// The underlying QuickJS runtime or context failed to initialize.
    #[error("failed to initialize quickjs runtime: {0}")]
    Runtime(String),
}

// ============================================================================
// SECTION: QuickJS Sandbox
// ============================================================================

/// A QuickJS-backed implementation of [`Sandbox`].
pub struct QuickJsSandbox {
    runtime: Mutex<Runtime>,
}

impl QuickJsSandbox {
    /// Builds a sandbox with the given hard memory ceiling, in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxInitError`] if the QuickJS runtime cannot be created.
    pub fn new(memory_limit_bytes: usize) -> Result<Self, SandboxInitError> {
        let runtime = Runtime::new().map_err(|err| SandboxInitError::Runtime(err.to_string()))?;
        runtime.set_memory_limit(memory_limit_bytes);
        Ok(Self {
            runtime: Mutex::new(runtime),
        })
    }
}

impl Sandbox for QuickJsSandbox {
    fn evaluate(&self, script: &str, ctx: &SandboxContext) -> Result<Value, SandboxError> {
        let runtime = self.runtime.lock().map_err(|_| SandboxError::ScriptFailed("sandbox runtime poisoned".to_string()))?;

        let context = Context::full(&runtime).map_err(|err| SandboxError::ScriptFailed(err.to_string()))?;

        let ticker = TimeoutTicker::start(ctx.timeout);
        let flag = ticker.interrupt_flag();
        runtime.set_interrupt_handler(Some(Box::new(move || flag.load(std::sync::atomic::Ordering::Relaxed))));

        let result = context.with(|js_ctx| run_script(js_ctx, script, ctx));

        runtime.set_interrupt_handler(None);
        let timed_out = ticker.timed_out();
        ticker.cancel();
        drop(runtime);

        match result {
            Ok(value) => Ok(value),
            Err(_) if timed_out => Err(SandboxError::Timeout(u64::try_from(ctx.timeout.as_millis()).unwrap_or(u64::MAX))),
            Err(message) => Err(SandboxError::ScriptFailed(message)),
        }
    }
}

// ============================================================================
// SECTION: Script Execution
// ============================================================================

fn run_script(js_ctx: Ctx<'_>, script: &str, sandbox_ctx: &SandboxContext) -> Result<Value, String> {
    bind_globals(&js_ctx, sandbox_ctx).map_err(|err| err.to_string())?;
    let result: JsValue = js_ctx.eval(script).map_err(|err| err.to_string())?;
    js_to_json(&result)
}

fn bind_globals(js_ctx: &Ctx<'_>, sandbox_ctx: &SandboxContext) -> rquickjs::Result<()> {
    let globals = js_ctx.globals();

    globals.set("payload", json_to_js(js_ctx, &sandbox_ctx.payload)?)?;
    globals.set("context", json_to_js(js_ctx, &sandbox_ctx.context)?)?;

    let lookup_tables = sandbox_ctx.lookup_tables.clone();
    globals.set(
        "lookup",
        Function::new(js_ctx.clone(), move |code: String, lookup_type: String| -> rquickjs::Result<String> {
            Ok(resolve_lookup(&lookup_tables, &code, &lookup_type))
        })?,
    )?;

    globals.set("now", Function::new(js_ctx.clone(), || -> i64 { Timestamp::now().as_millis() })?)?;
    globals.set("epoch", Function::new(js_ctx.clone(), || -> i64 { Timestamp::now().as_unix_seconds() })?)?;
    globals.set("toTimestamp", Function::new(js_ctx.clone(), |millis: i64| -> i64 { millis })?)?;
    globals.set("parseDate", Function::new(js_ctx.clone(), |text: String| -> rquickjs::Result<i64> {
        parse_date_millis(&text).map_err(rquickjs::Error::new_into_js_message)
    })?)?;
    globals.set("datetime", Function::new(js_ctx.clone(), |date: String, time: String, tz: String| -> rquickjs::Result<i64> {
        parse_datetime_millis(&date, &time, &tz).map_err(rquickjs::Error::new_into_js_message)
    })?)?;
    globals.set("addMinutes", Function::new(js_ctx.clone(), |millis: i64, amount: i64| -> i64 { millis + amount * 60_000 })?)?;
    globals.set("addHours", Function::new(js_ctx.clone(), |millis: i64, amount: i64| -> i64 { millis + amount * 3_600_000 })?)?;
    globals.set("addDays", Function::new(js_ctx.clone(), |millis: i64, amount: i64| -> i64 { millis + amount * 86_400_000 })?)?;
    globals.set("subtractMinutes", Function::new(js_ctx.clone(), |millis: i64, amount: i64| -> i64 { millis - amount * 60_000 })?)?;
    globals.set("subtractHours", Function::new(js_ctx.clone(), |millis: i64, amount: i64| -> i64 { millis - amount * 3_600_000 })?)?;
    globals.set("subtractDays", Function::new(js_ctx.clone(), |millis: i64, amount: i64| -> i64 { millis - amount * 86_400_000 })?)?;

    Ok(())
}

fn resolve_lookup(tables: &[LookupTable], code: &str, lookup_type: &str) -> String {
    let chain: Vec<&LookupTable> = tables.iter().filter(|table| table.lookup_type == lookup_type).collect();
    match resolve_hierarchical(&chain, code) {
        Ok(Value::String(text)) => text,
        Ok(other) => other.to_string(),
        Err(_) if chain.is_empty() => code.to_string(),
        Err(_) => code.to_string(),
    }
}

fn parse_date_millis(text: &str) -> Result<i64, String> {
    let parsed = time::OffsetDateTime::parse(text, &time::format_description::well_known::Rfc3339)
        .map_err(|err| err.to_string())?;
    Ok((parsed.unix_timestamp_nanos() / 1_000_000) as i64)
}

fn parse_datetime_millis(date: &str, time_of_day: &str, tz_offset: &str) -> Result<i64, String> {
    parse_date_millis(&format!("{date}T{time_of_day}{tz_offset}"))
}

// ============================================================================
// SECTION: JSON <-> QuickJS Value Conversion
// ============================================================================

fn json_to_js<'js>(js_ctx: &Ctx<'js>, value: &Value) -> rquickjs::Result<JsValue<'js>> {
    match value {
        Value::Null => Ok(JsValue::new_null(js_ctx.clone())),
        Value::Bool(flag) => Ok(JsValue::new_bool(js_ctx.clone(), *flag)),
        Value::Number(number) => Ok(JsValue::new_number(js_ctx.clone(), number.as_f64().unwrap_or(0.0))),
        Value::String(text) => {
            let js_string = rquickjs::String::from_str(js_ctx.clone(), text)?;
            Ok(js_string.into_value())
        }
        Value::Array(items) => {
            let array = rquickjs::Array::new(js_ctx.clone())?;
            for (index, item) in items.iter().enumerate() {
                array.set(index, json_to_js(js_ctx, item)?)?;
            }
            Ok(array.into_value())
        }
        Value::Object(map) => {
            let object = Object::new(js_ctx.clone())?;
            for (key, item) in map {
                object.set(key.as_str(), json_to_js(js_ctx, item)?)?;
            }
            Ok(object.into_value())
        }
    }
}

fn js_to_json(value: &JsValue<'_>) -> Result<Value, String> {
    if value.is_null() || value.is_undefined() {
        return Ok(Value::Null);
    }
    if let Some(flag) = value.as_bool() {
        return Ok(Value::Bool(flag));
    }
    if let Some(number) = value.as_float() {
        return Ok(serde_json::Number::from_f64(number).map_or(Value::Null, Value::Number));
    }
    if let Some(int) = value.as_int() {
        return Ok(Value::Number(int.into()));
    }
    if let Some(text) = value.as_string() {
        return text.to_string().map(Value::String).map_err(|err| err.to_string());
    }
    if let Some(array) = value.as_array() {
        let mut items = Vec::with_capacity(array.len());
        for item in array.iter::<JsValue<'_>>() {
            items.push(js_to_json(&item.map_err(|err| err.to_string())?)?);
        }
        return Ok(Value::Array(items));
    }
    if let Some(object) = value.as_object() {
        let mut map = serde_json::Map::new();
        for key in object.keys::<String>() {
            let key = key.map_err(|err| err.to_string())?;
            let item: JsValue<'_> = object.get(key.as_str()).map_err(|err| err.to_string())?;
            map.insert(key, js_to_json(&item)?);
        }
        return Ok(Value::Object(map));
    }
    Err("unsupported script return type".to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use gateway_core::core::TenantId;

    use super::*;

    fn ctx(payload: Value) -> SandboxContext {
        SandboxContext {
            payload,
            context: serde_json::json!({"eventType": "OP_VISIT_CREATED", "tenantId": "t1", "orgId": "o1"}),
            timeout: Duration::from_secs(2),
            lookup_tables: Vec::new(),
        }
    }

    #[test]
    fn evaluates_arithmetic_over_payload() {
        let sandbox = QuickJsSandbox::new(16 * 1024 * 1024).expect("sandbox");
        let result = sandbox.evaluate("payload.amount * 2", &ctx(serde_json::json!({"amount": 21}))).expect("eval");
        assert_eq!(result, Value::Number(42.into()));
    }

    #[test]
    fn returns_object_literal() {
        let sandbox = QuickJsSandbox::new(16 * 1024 * 1024).expect("sandbox");
        let result = sandbox
            .evaluate("({patientId: payload.id, source: context.eventType})", &ctx(serde_json::json!({"id": "p-1"})))
            .expect("eval");
        assert_eq!(result["patientId"], Value::String("p-1".to_string()));
        assert_eq!(result["source"], Value::String("OP_VISIT_CREATED".to_string()));
    }

    #[test]
    fn times_out_on_infinite_loop() {
        let sandbox = QuickJsSandbox::new(16 * 1024 * 1024).expect("sandbox");
        let mut call = ctx(Value::Null);
        call.timeout = Duration::from_millis(50);
        let result = sandbox.evaluate("while (true) {}", &call);
        assert!(matches!(result, Err(SandboxError::Timeout(_))));
    }

    #[test]
    fn script_errors_surface_as_script_failed() {
        let sandbox = QuickJsSandbox::new(16 * 1024 * 1024).expect("sandbox");
        let result = sandbox.evaluate("throw new Error('boom')", &ctx(Value::Null));
        assert!(matches!(result, Err(SandboxError::ScriptFailed(_))));
    }

    #[test]
    fn lookup_resolves_hierarchically() {
        let sandbox = QuickJsSandbox::new(16 * 1024 * 1024).expect("sandbox");
        let mut call = ctx(Value::Null);
        call.lookup_tables = vec![LookupTable {
            tenant_id: TenantId::new("t1"),
            lookup_type: "department_code".to_string(),
            entries: [("X".to_string(), Value::String("Cardiology".to_string()))].into_iter().collect(),
            unmapped_behavior: UnmappedBehavior::Passthrough,
        }];
        let result = sandbox.evaluate("lookup('X', 'department_code')", &call).expect("eval");
        assert_eq!(result, Value::String("Cardiology".to_string()));
    }

    #[test]
    fn time_helpers_compose() {
        let sandbox = QuickJsSandbox::new(16 * 1024 * 1024).expect("sandbox");
        let result = sandbox.evaluate("addMinutes(1000, 1)", &ctx(Value::Null)).expect("eval");
        assert_eq!(result, Value::Number(61000.into()));
    }
}
