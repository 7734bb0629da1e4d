use anyhow::{Context, Result};
use downlink::module::{ModuleDescriptor, RunReport};
use handlebars::{handlebars_helper, Handlebars};
use serde::Serialize;
use std::io::{stdout, Write};

#[derive(Debug, Clone)]
pub enum Format {
    Json,
    Text,
}

impl clap::ValueEnum for Format {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Json, Self::Text]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            Self::Json => Some(clap::builder::PossibleValue::new("json")),
            Self::Text => Some(clap::builder::PossibleValue::new("text")),
        }
    }
}

#[derive(Serialize)]
struct Modules<'a> {
    modules: Vec<&'a ModuleDescriptor>,
}

#[derive(Serialize)]
struct Reports<'a> {
    reports: &'a [RunReport],
}

pub fn modules<'a>(
    descriptors: impl Iterator<Item = &'a ModuleDescriptor>,
    format: &Format,
) -> Result<()> {
    let modules = Modules {
        modules: descriptors.collect(),
    };
    write(&modules, format, "modules")
}

pub fn reports(reports: &[RunReport], format: &Format) -> Result<()> {
    write(&Reports { reports }, format, "reports")
}

fn write<T: Serialize>(data: &T, format: &Format, template: &str) -> Result<()> {
    let mut out = stdout();
    match format {
        Format::Json => {
            serde_json::to_writer_pretty(&mut out, data).context("serializing to json")?;
            writeln!(out).context("writing to stdout")
        }
        Format::Text => {
            let text = render_text(data, template)?;
            out.write_all(text.as_bytes()).context("writing to stdout")
        }
    }
}

fn pad(num: u64, v: &serde_json::Value, left: bool) -> String {
    let v = match v {
        serde_json::Value::String(s) => s.to_owned(),
        serde_json::Value::Null => String::new(),
        _ => v.to_string(),
    };
    let fill = " ".repeat((num as usize).saturating_sub(v.len()));
    if left {
        fill + &v
    } else {
        v + &fill
    }
}

fn render_text<T: Serialize>(data: &T, template: &str) -> Result<String> {
    handlebars_helper!(left_pad: |num: u64, v: Json| pad(num, v, true));
    handlebars_helper!(right_pad: |num: u64, v: Json| pad(num, v, false));

    let mut hb = Handlebars::new();
    hb.register_escape_fn(handlebars::no_escape);
    hb.register_helper("lpad", Box::new(left_pad));
    hb.register_helper("rpad", Box::new(right_pad));
    hb.register_template_string("modules", MODULES_TEMPLATE)
        .context("registering modules template")?;
    hb.register_template_string("reports", REPORTS_TEMPLATE)
        .context("registering reports template")?;

    hb.render(template, data).context("rendering text")
}

const MODULES_TEMPLATE: &str = r"{{ #each modules }}{{ id }} ({{ label }})
{{ #each parameters }}    {{ rpad 20 name }} {{ rpad 6 kind }} {{ lpad 6 default }}  {{ description }}
{{ /each }}
{{ /each }}";

const REPORTS_TEMPLATE: &str = r"{{ #each reports }}{{ module }}: {{ input }}
===============================================================================================
Output:     {{ output_dir }}
Bytes:      {{ stats.bytes }} ({{ stats.truncated_bytes }} truncated)
Frames:     {{ stats.frames }} ({{ stats.matched_frames }} matched, {{ stats.demux.missing_frames }} missing)
Packets:    {{ stats.demux.packets }} ({{ stats.demux.lost }} lost, {{ stats.demux.invalid }} invalid, {{ stats.unrouted }} unrouted)
Loss:       {{ loss_ratio }}{{ #if degraded }} DEGRADED{{ /if }}
{{ #if read_error }}Read error: {{ read_error }}
{{ /if }}
Instrument      Lines  Malformed
-------------------------------------------
{{ #each stats.instruments }}{{ rpad 10 instrument }} {{ lpad 10 lines }} {{ lpad 10 malformed }}
{{ /each }}
{{ #if stats.routed }}APID      Routed
-------------------------------------------
{{ #each stats.routed }}{{ lpad 4 @key }} {{ lpad 11 this }}
{{ /each }}
{{ /if }}Outputs:
{{ #each outputs }}  {{ this }}
{{ /each }}{{ #if failures }}Failures:
{{ #each failures }}  {{ path }}: {{ error }}
{{ /each }}{{ /if }}
{{ /each }}";
