use serde_json::{Map, Value};

/// Global the linker binds icon imports from.
pub const REGISTRY_IDENT: &str = "__icons";

const CIRCLE_10: &str = "M12 2a10 10 0 1 0 0 20a10 10 0 1 0 0-20";

/// `(name, path data)` for each shimmed icon, drawn on a 24x24 stroke grid.
const ICONS: &[(&str, &[&str])] = &[
    ("AlertCircle", &[CIRCLE_10, "M12 8v4", "M12 16h.01"]),
    ("ArrowLeft", &["m12 19-7-7 7-7", "M19 12H5"]),
    ("ArrowRight", &["M5 12h14", "m12 5 7 7-7 7"]),
    ("Bell", &["M6 8a6 6 0 0 1 12 0c0 7 3 9 3 9H3s3-2 3-9", "M10.3 21a1.94 1.94 0 0 0 3.4 0"]),
    ("Calendar", &["M5 4h14a2 2 0 0 1 2 2v14a2 2 0 0 1-2 2H5a2 2 0 0 1-2-2V6a2 2 0 0 1 2-2z", "M16 2v4", "M8 2v4", "M3 10h18"]),
    ("Check", &["M20 6 9 17l-5-5"]),
    ("CheckCircle", &[CIRCLE_10, "m9 12 2 2 4-4"]),
    ("ChevronDown", &["m6 9 6 6 6-6"]),
    ("ChevronLeft", &["m15 18-6-6 6-6"]),
    ("ChevronRight", &["m9 18 6-6-6-6"]),
    ("ChevronUp", &["m18 15-6-6-6 6"]),
    ("Clock", &[CIRCLE_10, "M12 6v6l4 2"]),
    ("Download", &["M21 15v4a2 2 0 0 1-2 2H5a2 2 0 0 1-2-2v-4", "m7 10 5 5 5-5", "M12 15V3"]),
    ("ExternalLink", &["M15 3h6v6", "M10 14 21 3", "M18 13v6a2 2 0 0 1-2 2H5a2 2 0 0 1-2-2V8a2 2 0 0 1 2-2h6"]),
    ("Eye", &["M2 12s3-7 10-7 10 7 10 7-3 7-10 7-10-7-10-7Z", "M12 9a3 3 0 1 0 0 6a3 3 0 1 0 0-6"]),
    ("Filter", &["M22 3H2l8 9.46V19l4 2v-8.54L22 3z"]),
    ("Heart", &["M19 14c1.49-1.46 3-3.21 3-5.5A5.5 5.5 0 0 0 16.5 3c-1.76 0-3 .5-4.5 2-1.5-1.5-2.74-2-4.5-2A5.5 5.5 0 0 0 2 8.5c0 2.3 1.5 4.05 3 5.5l7 7Z"]),
    ("Home", &["m3 9 9-7 9 7v11a2 2 0 0 1-2 2H5a2 2 0 0 1-2-2z", "M9 22V12h6v10"]),
    ("Info", &[CIRCLE_10, "M12 16v-4", "M12 8h.01"]),
    ("Loader2", &["M21 12a9 9 0 1 1-6.219-8.56"]),
    ("LogOut", &["M9 21H5a2 2 0 0 1-2-2V5a2 2 0 0 1 2-2h4", "m16 17 5-5-5-5", "M21 12H9"]),
    ("Mail", &["M4 4h16a2 2 0 0 1 2 2v12a2 2 0 0 1-2 2H4a2 2 0 0 1-2-2V6a2 2 0 0 1 2-2z", "m22 6-10 7L2 6"]),
    ("Menu", &["M4 12h16", "M4 6h16", "M4 18h16"]),
    ("Minus", &["M5 12h14"]),
    ("Moon", &["M12 3a6 6 0 0 0 9 9 9 9 0 1 1-9-9Z"]),
    ("Pencil", &["M17 3a2.85 2.83 0 1 1 4 4L7.5 20.5 2 22l1.5-5.5Z"]),
    ("Plus", &["M5 12h14", "M12 5v14"]),
    ("Search", &["M11 3a8 8 0 1 0 0 16a8 8 0 1 0 0-16", "m21 21-4.3-4.3"]),
    ("Settings", &["M12 9a3 3 0 1 0 0 6a3 3 0 1 0 0-6", "M12 2v2", "M12 20v2", "m4.9 4.9 1.4 1.4", "m17.7 17.7 1.4 1.4", "M2 12h2", "M20 12h2", "m6.3 17.7-1.4 1.4", "m19.1 4.9-1.4 1.4"]),
    ("ShoppingCart", &["M8 20a1 1 0 1 0 0 2a1 1 0 1 0 0-2", "M19 20a1 1 0 1 0 0 2a1 1 0 1 0 0-2", "M2.05 2.05h2l2.66 12.42a2 2 0 0 0 2 1.58h9.78a2 2 0 0 0 1.95-1.57l1.65-7.43H5.12"]),
    ("Star", &["M12 2l3.09 6.26L22 9.27l-5 4.87 1.18 6.88L12 17.77l-6.18 3.25L7 14.14 2 9.27l6.91-1.01L12 2z"]),
    ("Sun", &["M12 8a4 4 0 1 0 0 8a4 4 0 1 0 0-8", "M12 2v2", "M12 20v2", "m4.93 4.93 1.41 1.41", "m17.66 17.66 1.41 1.41", "M2 12h2", "M20 12h2", "m6.34 17.66-1.41 1.41", "m19.07 4.93-1.41 1.41"]),
    ("Trash2", &["M3 6h18", "M19 6v14c0 1-1 2-2 2H7c-1 0-2-1-2-2V6", "M8 6V4c0-1 1-2 2-2h4c1 0 2 1 2 2v2", "M10 11v6", "M14 11v6"]),
    ("Upload", &["M21 15v4a2 2 0 0 1-2 2H5a2 2 0 0 1-2-2v-4", "m17 8-5-5-5 5", "M12 3v12"]),
    ("User", &["M19 21v-2a4 4 0 0 0-4-4H9a4 4 0 0 0-4 4v2", "M12 3a4 4 0 1 0 0 8a4 4 0 1 0 0-8"]),
    ("X", &["M18 6 6 18", "m6 6 12 12"]),
];

/// Alternate names the icon library exports for the same glyph.
const ALIASES: &[(&str, &str)] = &[
    ("CheckCircle2", "CheckCircle"),
    ("Edit", "Pencil"),
    ("Loader", "Loader2"),
    ("Trash", "Trash2"),
    ("XIcon", "X"),
];

/// Placeholder drawn for icons without a shim.
const FALLBACK: &[&str] = &["M5 3h14a2 2 0 0 1 2 2v14a2 2 0 0 1-2 2H5a2 2 0 0 1-2-2V5a2 2 0 0 1 2-2z"];

pub fn icon_names() -> impl Iterator<Item = &'static str> {
    ICONS
        .iter()
        .map(|(name, _)| *name)
        .chain(ALIASES.iter().map(|(alias, _)| *alias))
}

fn path_table() -> Value {
    let mut table = Map::new();
    for (name, paths) in ICONS {
        table.insert((*name).to_string(), Value::from(paths.to_vec()));
    }
    for (alias, target) in ALIASES {
        if let Some((_, paths)) = ICONS.iter().find(|(name, _)| name == target) {
            table.insert((*alias).to_string(), Value::from(paths.to_vec()));
        }
    }
    Value::Object(table)
}

/// Returns the script defining the icon registry global.
pub fn registry_source() -> String {
    format!(
        r#"const {REGISTRY_IDENT} = (function () {{
  const paths = {table};
  const fallback = {fallback};
  function make(name, shapes) {{
    const Icon = function (props) {{
      props = props || {{}};
      const size = props.size || 24;
      const rest = Object.assign({{}}, props);
      delete rest.size;
      delete rest.color;
      delete rest.strokeWidth;
      return React.createElement(
        "svg",
        Object.assign({{
          xmlns: "http://www.w3.org/2000/svg",
          width: size,
          height: size,
          viewBox: "0 0 24 24",
          fill: "none",
          stroke: props.color || "currentColor",
          strokeWidth: props.strokeWidth || 2,
          strokeLinecap: "round",
          strokeLinejoin: "round"
        }}, rest),
        shapes.map(function (d, i) {{ return React.createElement("path", {{ key: i, d: d }}); }})
      );
    }};
    Icon.displayName = name;
    return Icon;
  }}
  const made = Object.create(null);
  return new Proxy(made, {{
    get: function (target, key) {{
      if (typeof key !== "string") return undefined;
      if (!(key in target)) target[key] = make(key, paths[key] || fallback);
      return target[key];
    }}
  }});
}})();
"#,
        table = path_table(),
        fallback = Value::from(FALLBACK.to_vec()),
    )
}
