//! Custom helpers available to response templates.
//!
//! Helpers fall into three groups: request accessors (`header`, `query`),
//! utilities (`trim_prefix`, `json_pretty`, `sleep`, `uuid`, `rand_*`) and
//! fake data generators backed by small embedded tables.

use std::thread;
use std::time::Duration;

use handlebars::{
    Context, Handlebars, Helper, HelperResult, Output, RenderContext, RenderError,
    RenderErrorReason,
};
use rand::Rng;
use serde_json::Value;
use uuid::Uuid;

/// Registers every helper on the given registry.
pub fn register_all(registry: &mut Handlebars<'static>) {
    registry.register_helper("header", Box::new(header));
    registry.register_helper("query", Box::new(query));
    registry.register_helper("trim_prefix", Box::new(trim_prefix));
    registry.register_helper("json_pretty", Box::new(json_pretty));
    registry.register_helper("sleep", Box::new(sleep));
    registry.register_helper("uuid", Box::new(uuid));
    registry.register_helper("rand_int", Box::new(rand_int));
    registry.register_helper("rand_float", Box::new(rand_float));
    registry.register_helper("rand_choice", Box::new(rand_choice));
    registry.register_helper("fake_name", Box::new(fake_name));
    registry.register_helper("fake_first_name", Box::new(fake_first_name));
    registry.register_helper("fake_last_name", Box::new(fake_last_name));
    registry.register_helper("fake_email", Box::new(fake_email));
    registry.register_helper("fake_username", Box::new(fake_username));
    registry.register_helper("fake_word", Box::new(fake_word));
    registry.register_helper("fake_sentence", Box::new(fake_sentence));
    registry.register_helper("fake_city", Box::new(fake_city));
    registry.register_helper("fake_country", Box::new(fake_country));
    registry.register_helper("fake_color", Box::new(fake_color));
    registry.register_helper("fake_hex_color", Box::new(fake_hex_color));
}

fn param_str<'a>(h: &'a Helper, index: usize, name: &'static str) -> Result<&'a str, RenderError> {
    h.param(index)
        .and_then(|p| p.value().as_str())
        .ok_or_else(|| RenderErrorReason::ParamNotFoundForIndex(name, index).into())
}

fn param_f64(h: &Helper, index: usize, name: &'static str) -> Result<f64, RenderError> {
    h.param(index)
        .and_then(|p| p.value().as_f64())
        .ok_or_else(|| RenderErrorReason::ParamNotFoundForIndex(name, index).into())
}

/// `{{header "X-User-Id"}}`: first value of a request header, name
/// compared case-insensitively. Missing headers render as empty.
fn header(
    h: &Helper,
    _: &Handlebars,
    ctx: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let wanted = param_str(h, 0, "header")?.to_ascii_lowercase();
    if let Some(headers) = ctx.data().get("headers").and_then(Value::as_object) {
        for (name, value) in headers {
            if name.to_ascii_lowercase() == wanted {
                if let Some(text) = value.as_str() {
                    out.write(text)?;
                }
                break;
            }
        }
    }
    Ok(())
}

/// `{{query "debug"}}`: a query parameter, empty when absent.
fn query(
    h: &Helper,
    _: &Handlebars,
    ctx: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let wanted = param_str(h, 0, "query")?;
    if let Some(text) = ctx
        .data()
        .get("query")
        .and_then(|q| q.get(wanted))
        .and_then(Value::as_str)
    {
        out.write(text)?;
    }
    Ok(())
}

/// `{{trim_prefix "/api" path}}`: removes a leading prefix when present.
fn trim_prefix(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let prefix = param_str(h, 0, "trim_prefix")?;
    let value = param_str(h, 1, "trim_prefix")?;
    out.write(value.strip_prefix(prefix).unwrap_or(value))?;
    Ok(())
}

/// `{{json_pretty body}}`: pretty-printed JSON of any context value.
fn json_pretty(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let value = h
        .param(0)
        .map(|p| p.value())
        .ok_or(RenderErrorReason::ParamNotFoundForIndex("json_pretty", 0))?;
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| RenderErrorReason::NestedError(Box::new(err)))?;
    out.write(&rendered)?;
    Ok(())
}

/// `{{sleep "250ms"}}` or `{{sleep 2}}`: delays rendering, for timeout
/// testing. Unparsable durations sleep for nothing rather than erroring.
///
/// Runs on the blocking render thread, never on the async executor.
fn sleep(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    _: &mut dyn Output,
) -> HelperResult {
    let duration = h
        .param(0)
        .map(|p| sleep_duration(p.value()))
        .unwrap_or(Duration::ZERO);
    if !duration.is_zero() {
        thread::sleep(duration);
    }
    Ok(())
}

fn sleep_duration(value: &Value) -> Duration {
    match value {
        Value::String(text) => parse_duration_text(text).unwrap_or(Duration::ZERO),
        Value::Number(number) => number
            .as_f64()
            .filter(|secs| *secs > 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or(Duration::ZERO),
        _ => Duration::ZERO,
    }
}

// Accepts "250ms", "1.5s", "2m", "1h" and bare numbers of seconds.
fn parse_duration_text(text: &str) -> Option<Duration> {
    const UNITS: [(&str, f64); 7] = [
        ("ms", 1e6),
        ("us", 1e3),
        ("µs", 1e3),
        ("ns", 1.0),
        ("s", 1e9),
        ("m", 60.0 * 1e9),
        ("h", 3600.0 * 1e9),
    ];

    let text = text.trim();
    for (suffix, nanos_per_unit) in UNITS {
        if let Some(number) = text.strip_suffix(suffix) {
            let value: f64 = number.trim().parse().ok()?;
            if value <= 0.0 {
                return Some(Duration::ZERO);
            }
            return Some(Duration::from_nanos((value * nanos_per_unit) as u64));
        }
    }
    let seconds: f64 = text.parse().ok()?;
    if seconds <= 0.0 {
        return Some(Duration::ZERO);
    }
    Some(Duration::from_secs_f64(seconds))
}

/// `{{uuid}}`: a fresh v4 UUID per evaluation.
fn uuid(
    _: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&Uuid::new_v4().to_string())?;
    Ok(())
}

/// `{{rand_int 1 100}}`: random integer in `[min, max)`. Swapped bounds
/// are reordered; equal bounds return the bound itself.
fn rand_int(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let a = param_f64(h, 0, "rand_int")? as i64;
    let b = param_f64(h, 1, "rand_int")? as i64;
    let (min, max) = if a <= b { (a, b) } else { (b, a) };
    let picked = if min == max {
        min
    } else {
        rand::thread_rng().gen_range(min..max)
    };
    out.write(&picked.to_string())?;
    Ok(())
}

/// `{{rand_float 0 1}}`: random float in `[min, max)`, bounds reordered
/// like `rand_int`.
fn rand_float(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let a = param_f64(h, 0, "rand_float")?;
    let b = param_f64(h, 1, "rand_float")?;
    let (min, max) = if a <= b { (a, b) } else { (b, a) };
    let picked = if min == max {
        min
    } else {
        rand::thread_rng().gen_range(min..max)
    };
    out.write(&picked.to_string())?;
    Ok(())
}

/// `{{rand_choice "red" "green" "blue"}}`: one of the arguments, uniformly.
/// No arguments renders nothing.
fn rand_choice(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let params = h.params();
    if params.is_empty() {
        return Ok(());
    }
    let picked = params[rand::thread_rng().gen_range(0..params.len())].value();
    match picked.as_str() {
        Some(text) => out.write(text)?,
        None => out.write(&picked.to_string())?,
    }
    Ok(())
}

const FIRST_NAMES: [&str; 20] = [
    "Alice", "Bruno", "Carmen", "Dmitri", "Elena", "Farid", "Greta", "Hiro", "Ines", "Jonas",
    "Kira", "Liam", "Mona", "Nadia", "Oscar", "Priya", "Quentin", "Rosa", "Samir", "Tessa",
];

const LAST_NAMES: [&str; 20] = [
    "Alvarez", "Berg", "Chen", "Dubois", "Eriksen", "Fischer", "Garcia", "Haddad", "Ivanov",
    "Johnson", "Kowalski", "Larsen", "Moretti", "Nakamura", "Okafor", "Petrov", "Quinn", "Rossi",
    "Santos", "Tanaka",
];

const WORDS: [&str; 24] = [
    "lorem", "ipsum", "dolor", "amet", "consectetur", "adipiscing", "elit", "tempor", "incididunt",
    "labore", "dolore", "magna", "aliqua", "veniam", "quis", "nostrud", "exercitation", "ullamco",
    "laboris", "nisi", "aliquip", "commodo", "consequat", "duis",
];

const CITIES: [&str; 16] = [
    "Amsterdam", "Bogota", "Cairo", "Denver", "Edinburgh", "Fukuoka", "Geneva", "Hanoi",
    "Istanbul", "Jakarta", "Kampala", "Lisbon", "Montreal", "Nairobi", "Oslo", "Porto",
];

const COUNTRIES: [&str; 16] = [
    "Argentina", "Brazil", "Canada", "Denmark", "Egypt", "Finland", "Ghana", "Hungary", "India",
    "Japan", "Kenya", "Latvia", "Mexico", "Norway", "Portugal", "Sweden",
];

const COLORS: [&str; 12] = [
    "red", "orange", "yellow", "green", "blue", "indigo", "violet", "teal", "maroon", "olive",
    "navy", "silver",
];

const EMAIL_DOMAINS: [&str; 4] = ["example.com", "example.org", "example.net", "mail.test"];

fn pick(items: &'static [&'static str]) -> &'static str {
    items[rand::thread_rng().gen_range(0..items.len())]
}

fn fake_name(
    _: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&format!("{} {}", pick(&FIRST_NAMES), pick(&LAST_NAMES)))?;
    Ok(())
}

fn fake_first_name(
    _: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(pick(&FIRST_NAMES))?;
    Ok(())
}

fn fake_last_name(
    _: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(pick(&LAST_NAMES))?;
    Ok(())
}

fn fake_email(
    _: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&format!(
        "{}.{}@{}",
        pick(&FIRST_NAMES).to_ascii_lowercase(),
        pick(&LAST_NAMES).to_ascii_lowercase(),
        pick(&EMAIL_DOMAINS)
    ))?;
    Ok(())
}

fn fake_username(
    _: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&format!(
        "{}{}",
        pick(&FIRST_NAMES).to_ascii_lowercase(),
        rand::thread_rng().gen_range(10..100)
    ))?;
    Ok(())
}

fn fake_word(
    _: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(pick(&WORDS))?;
    Ok(())
}

/// `{{fake_sentence}}` or `{{fake_sentence 5}}`: a capitalized sentence of
/// the requested word count (default 8).
fn fake_sentence(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let count = h
        .param(0)
        .and_then(|p| p.value().as_u64())
        .unwrap_or(8)
        .clamp(1, 64) as usize;

    let mut sentence = String::new();
    for i in 0..count {
        let word = pick(&WORDS);
        if i == 0 {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                sentence.push(first.to_ascii_uppercase());
                sentence.push_str(chars.as_str());
            }
        } else {
            sentence.push(' ');
            sentence.push_str(word);
        }
    }
    sentence.push('.');
    out.write(&sentence)?;
    Ok(())
}

fn fake_city(
    _: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(pick(&CITIES))?;
    Ok(())
}

fn fake_country(
    _: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(pick(&COUNTRIES))?;
    Ok(())
}

fn fake_color(
    _: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(pick(&COLORS))?;
    Ok(())
}

fn fake_hex_color(
    _: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&format!(
        "#{:06x}",
        rand::thread_rng().gen_range(0..0x100_0000u32)
    ))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use serde_json::json;

    use super::*;

    fn render_one(template: &str, data: &serde_json::Value) -> Result<String, RenderError> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        register_all(&mut registry);
        registry.render_template(template, data)
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let data = json!({"headers": {"content-type": "application/json"}});
        let out = render_one(r#"{{header "Content-Type"}}"#, &data).unwrap();
        assert_eq!(out, "application/json");
    }

    #[test]
    fn missing_header_renders_empty() {
        let out = render_one(r#"{{header "X-Nope"}}"#, &json!({"headers": {}})).unwrap();
        assert_eq!(out, "");
    }

    #[test]
    fn query_helper_reads_parameters() {
        let data = json!({"query": {"debug": "1"}});
        assert_eq!(render_one(r#"{{query "debug"}}"#, &data).unwrap(), "1");
        assert_eq!(render_one(r#"{{query "other"}}"#, &data).unwrap(), "");
    }

    #[test]
    fn trim_prefix_strips_only_a_leading_match() {
        let data = json!({"path": "/api/users"});
        assert_eq!(
            render_one(r#"{{trim_prefix "/api" path}}"#, &data).unwrap(),
            "/users"
        );
        assert_eq!(
            render_one(r#"{{trim_prefix "/v2" path}}"#, &data).unwrap(),
            "/api/users"
        );
    }

    #[test]
    fn json_pretty_formats_context_values() {
        let data = json!({"body": {"id": 7}});
        let out = render_one("{{json_pretty body}}", &data).unwrap();
        assert!(out.contains("\"id\": 7"));
    }

    #[test]
    fn json_pretty_without_argument_fails() {
        assert!(render_one("{{json_pretty}}", &json!({})).is_err());
    }

    #[test]
    fn uuid_has_the_canonical_shape() {
        let out = render_one("{{uuid}}", &json!({})).unwrap();
        assert_eq!(out.len(), 36);
        assert_eq!(out.matches('-').count(), 4);
    }

    #[test]
    fn rand_int_respects_bounds() {
        for _ in 0..50 {
            let out = render_one("{{rand_int 1 5}}", &json!({})).unwrap();
            let value: i64 = out.parse().unwrap();
            assert!((1..5).contains(&value), "out of range: {}", value);
        }
    }

    #[test]
    fn rand_int_reorders_swapped_bounds() {
        let out = render_one("{{rand_int 5 1}}", &json!({})).unwrap();
        let value: i64 = out.parse().unwrap();
        assert!((1..5).contains(&value));
    }

    #[test]
    fn rand_float_respects_bounds() {
        for _ in 0..50 {
            let out = render_one("{{rand_float 0 1}}", &json!({})).unwrap();
            let value: f64 = out.parse().unwrap();
            assert!((0.0..1.0).contains(&value));
        }
    }

    #[test]
    fn rand_choice_picks_an_argument() {
        let out = render_one(r#"{{rand_choice "red" "green" "blue"}}"#, &json!({})).unwrap();
        assert!(["red", "green", "blue"].contains(&out.as_str()));
    }

    #[test]
    fn rand_choice_without_arguments_renders_nothing() {
        assert_eq!(render_one("{{rand_choice}}", &json!({})).unwrap(), "");
    }

    #[test]
    fn fake_helpers_produce_plausible_values() {
        let email = render_one("{{fake_email}}", &json!({})).unwrap();
        assert!(email.contains('@'));

        let name = render_one("{{fake_name}}", &json!({})).unwrap();
        assert_eq!(name.split_whitespace().count(), 2);

        let color = render_one("{{fake_hex_color}}", &json!({})).unwrap();
        assert_eq!(color.len(), 7);
        assert!(color.starts_with('#'));
        assert!(color[1..].chars().all(|c| c.is_ascii_hexdigit()));

        let sentence = render_one("{{fake_sentence 3}}", &json!({})).unwrap();
        assert!(sentence.ends_with('.'));
        assert_eq!(sentence.split_whitespace().count(), 3);
    }

    #[test]
    fn sleep_delays_rendering() {
        let start = Instant::now();
        render_one(r#"{{sleep "30ms"}}"#, &json!({})).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn sleep_ignores_unparsable_durations() {
        let start = Instant::now();
        render_one(r#"{{sleep "soon"}}"#, &json!({})).unwrap();
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn duration_text_parsing() {
        assert_eq!(
            parse_duration_text("250ms"),
            Some(Duration::from_millis(250))
        );
        assert_eq!(
            parse_duration_text("1.5s"),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(parse_duration_text("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration_text("3"), Some(Duration::from_secs(3)));
        assert_eq!(parse_duration_text("-1s"), Some(Duration::ZERO));
        assert_eq!(parse_duration_text("soon"), None);
    }

    #[test]
    fn numeric_sleep_durations_are_seconds() {
        assert_eq!(sleep_duration(&json!(2)), Duration::from_secs(2));
        assert_eq!(sleep_duration(&json!(0.25)), Duration::from_millis(250));
        assert_eq!(sleep_duration(&json!(-1)), Duration::ZERO);
        assert_eq!(sleep_duration(&json!(null)), Duration::ZERO);
    }
}
