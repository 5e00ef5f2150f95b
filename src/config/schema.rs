use serde_json::{json, Value};
use std::sync::LazyLock;

pub static CONFIG_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "app_name": { "type": "string" },
            "services": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name", "kind", "url"],
                    "properties": {
                        "name": { "type": "string", "minLength": 1 },
                        "kind": { "type": "string", "enum": ["radarr", "sonarr", "prowlarr"] },
                        "url": { "type": "string", "format": "uri" },
                        "api_key": { "type": "string" },
                        "timeout_secs": { "type": "integer", "minimum": 1 }
                    }
                }
            },
            "agents": {
                "type": "object",
                "properties": {
                    "health": { "$ref": "#/$defs/agent" },
                    "autoheal": { "$ref": "#/$defs/agent" },
                    "discovery": {
                        "type": "object",
                        "properties": {
                            "enabled": { "type": "boolean" },
                            "interval_secs": { "type": "integer", "minimum": 1 },
                            "priority": { "type": "string", "enum": ["critical", "high", "normal", "low"] },
                            "sources": { "type": "array", "items": { "type": "string", "minLength": 1 } },
                            "add_to": { "type": "string", "minLength": 1 },
                            "timeout_secs": { "type": "integer", "minimum": 1 }
                        }
                    }
                }
            },
            "resilience": {
                "type": "object",
                "properties": {
                    "failure_threshold": { "type": "integer", "minimum": 1 },
                    "reset_timeout_secs": { "type": "integer", "minimum": 1 },
                    "max_attempts": { "type": "integer", "minimum": 1 },
                    "base_delay_ms": { "type": "integer", "minimum": 0 },
                    "max_delay_ms": { "type": "integer", "minimum": 0 },
                    "call_timeout_secs": { "type": "integer", "minimum": 1 },
                    "fan_out": { "type": "integer", "minimum": 1 }
                }
            },
            "cache": {
                "type": "object",
                "properties": {
                    "capacity": { "type": "integer", "minimum": 1 },
                    "ttl_secs": { "type": "integer", "minimum": 1 }
                }
            },
            "events": {
                "type": "object",
                "properties": {
                    "max_events": { "type": "integer", "minimum": 1 },
                    "unhealthy_threshold": { "type": "integer", "minimum": 1 }
                }
            },
            "database": {
                "type": "object",
                "properties": {
                    "enabled": { "type": "boolean" },
                    "path": { "type": "string" }
                }
            },
            "api": {
                "type": "object",
                "properties": {
                    "host": { "type": "string" },
                    "port": { "type": "integer", "minimum": 1, "maximum": 65535 }
                }
            }
        },
        "$defs": {
            "agent": {
                "type": "object",
                "properties": {
                    "enabled": { "type": "boolean" },
                    "interval_secs": { "type": "integer", "minimum": 1 },
                    "priority": { "type": "string", "enum": ["critical", "high", "normal", "low"] },
                    "fail_on_target_failure": { "type": "boolean" },
                    "disable_after_failures": { "type": "integer", "minimum": 1 }
                }
            }
        }
    })
});
