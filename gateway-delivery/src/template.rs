// gateway-delivery/src/template.rs
// ============================================================================
// Module: Template Substitution
// Description: Variable substitution for scheduled fetch_data queries.
// Purpose: Resolve `{{config.*}}`, `{{date.*}}`, and `{{env.*}}` references
//          inside a templated SQL/Mongo/API query string.
// Dependencies: gateway-core, time
// ============================================================================

//! ## Overview
//! Templates use a `{{namespace.path}}` token grammar, matching the three
//! namespaces a scheduled job's `fetch_query` may reference: `config`
//! (integration/tenant identity), `date` (today's date and the current
//! instant), and `env` (process environment variables). An unrecognized
//! token is left verbatim rather than silently dropped, so a typo surfaces
//! as a query the backing store rejects instead of a query that silently
//! runs unfiltered.

use gateway_core::core::IntegrationId;
use gateway_core::core::TenantId;

/// Identity values a rendered query may substitute in.
pub struct TemplateContext<'a> {
    /// Tenant owning the firing schedule.
    pub tenant_id: &'a TenantId,
    /// Integration the firing schedule belongs to.
    pub integration_id: &'a IntegrationId,
}

/// Substitutes every `{{...}}` token in `template`.
#[must_use]
pub fn render_template(template: &str, ctx: &TemplateContext<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str("{{");
            rest = after;
            continue;
        };
        let token = after[..end].trim();
        out.push_str(&resolve_token(token, ctx));
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

fn resolve_token(token: &str, ctx: &TemplateContext<'_>) -> String {
    let Some((namespace, path)) = token.split_once('.') else {
        return format!("{{{{{token}}}}}");
    };
    match namespace {
        "config" => resolve_config(path, ctx),
        "date" => resolve_date(path),
        "env" => std::env::var(path).unwrap_or_default(),
        _ => format!("{{{{{token}}}}}"),
    }
}

fn resolve_config(path: &str, ctx: &TemplateContext<'_>) -> String {
    match path {
        "tenantId" => ctx.tenant_id.as_str().to_string(),
        "integrationId" => ctx.integration_id.as_str().to_string(),
        other => format!("{{{{config.{other}}}}}"),
    }
}

fn resolve_date(path: &str) -> String {
    let now = time::OffsetDateTime::now_utc();
    match path {
        "today()" | "today" => {
            let format = time::format_description::parse("[year]-[month]-[day]").unwrap_or_default();
            now.format(&format).unwrap_or_default()
        }
        "now()" | "now" => now.unix_timestamp().to_string(),
        other => format!("{{{{date.{other}}}}}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(unsafe_code, reason = "test mutates process env for a var no other test reads")]
    fn substitutes_config_and_env_tokens() {
        unsafe { std::env::set_var("GATEWAY_FETCH_TEST_VAR", "abc") };
        let ctx = TemplateContext { tenant_id: &TenantId::new("tenant-a"), integration_id: &IntegrationId::new("int-1") };
        let rendered = render_template(
            "SELECT * FROM orders WHERE tenant = '{{config.tenantId}}' AND env = '{{env.GATEWAY_FETCH_TEST_VAR}}'",
            &ctx,
        );
        assert_eq!(rendered, "SELECT * FROM orders WHERE tenant = 'tenant-a' AND env = 'abc'");
    }

    #[test]
    fn leaves_unknown_tokens_untouched() {
        let ctx = TemplateContext { tenant_id: &TenantId::new("tenant-a"), integration_id: &IntegrationId::new("int-1") };
        assert_eq!(render_template("{{bogus.thing}}", &ctx), "{{bogus.thing}}");
    }

    #[test]
    fn renders_todays_date_in_iso_form() {
        let ctx = TemplateContext { tenant_id: &TenantId::new("tenant-a"), integration_id: &IntegrationId::new("int-1") };
        let rendered = render_template("{{date.today()}}", &ctx);
        assert_eq!(rendered.len(), "YYYY-MM-DD".len());
        assert_eq!(rendered.as_bytes()[4], b'-');
    }
}
