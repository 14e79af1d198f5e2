use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::config::PreviewConfig;
use crate::project::{FileSet, Language, ProjectFile};
use crate::templates::{self, MOUNT_ID};
use crate::util::{self, escape_html, escape_inline_script};

static STYLESHEET_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<link\b[^>]*?\bhref\s*=\s*["']([^"']+\.css)(?:[?#][^"']*)?["'][^>]*>"#).expect("valid regex")
});

static SCRIPT_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<script\b([^>]*?)\bsrc\s*=\s*["']([^"']+)["']([^>]*)>\s*</script\s*>"#).expect("valid regex")
});

fn escape_style(css: &str) -> String {
    css.replace("</style", "<\\/style")
}

/// Concatenates every style-sheet file in file-set order.
pub fn css_layer(files: &FileSet) -> String {
    let mut css = String::new();
    for file in files.iter().filter(|f| f.language == Language::Css) {
        css.push_str(&format!("/* {} */\n", file.name));
        css.push_str(&file.content);
        if !file.content.ends_with('\n') {
            css.push('\n');
        }
    }
    css
}

/// Builds the document for component-framework stacks around a linked script.
pub fn component_document(config: &PreviewConfig, files: &FileSet, script: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>Preview</title>
{cdn}    <style>
{base}{css}    </style>
    <script>
{handler}    </script>
  </head>
  <body>
    <div id="{MOUNT_ID}"></div>
    <script>
{bootstrap}    </script>
    <script type="text/babel" data-presets="react">
{script}
    </script>
  </body>
</html>
"#,
        cdn = templates::cdn_head(config),
        base = templates::base_styles(),
        css = escape_style(&css_layer(files)),
        handler = templates::error_handler_script(),
        bootstrap = templates::bootstrap_script(),
        script = escape_inline_script(script),
    )
}

fn find_asset<'a>(files: &'a FileSet, reference: &str) -> Option<&'a ProjectFile> {
    let raw = reference.split(['?', '#']).next().unwrap_or(reference);
    if raw.contains("://") || raw.starts_with("//") {
        return None;
    }
    let path = raw.trim_start_matches("./").trim_start_matches('/');
    files.get(path).or_else(|| {
        let base = util::base_name(path);
        files.iter().find(|f| util::base_name(&f.name) == base)
    })
}

fn insert_before(html: &mut String, marker: &str, fragment: &str) -> bool {
    let lower = html.to_ascii_lowercase();
    match lower.rfind(marker) {
        Some(pos) => {
            html.insert_str(pos, fragment);
            true
        }
        None => false,
    }
}

/// Builds the markup-stack document: the entry HTML with referenced style
/// sheets and scripts inlined, remaining ones appended, and the styling engine
/// injected when the page does not load it already.
pub fn markup_document(config: &PreviewConfig, files: &FileSet, entry: &ProjectFile) -> String {
    let mut inlined: BTreeSet<String> = BTreeSet::new();

    let html = STYLESHEET_LINK.replace_all(&entry.content, |caps: &Captures| match find_asset(files, &caps[1]) {
        Some(file) => {
            inlined.insert(file.name.clone());
            format!("<style>\n{}</style>", escape_style(&file.content))
        }
        None => caps[0].to_string(),
    });
    let mut html = SCRIPT_SRC
        .replace_all(&html, |caps: &Captures| match find_asset(files, &caps[2]) {
            Some(file) if file.language == Language::JavaScript => {
                inlined.insert(file.name.clone());
                format!(
                    "<script{}{}>\n{}</script>",
                    caps[1].trim_end(),
                    caps[3].trim_end(),
                    escape_inline_script(&file.content)
                )
            }
            _ => caps[0].to_string(),
        })
        .into_owned();

    let extra_css: String = files
        .iter()
        .filter(|f| f.language == Language::Css && !inlined.contains(&f.name))
        .map(|f| format!("<style>\n/* {} */\n{}</style>\n", f.name, escape_style(&f.content)))
        .collect();
    let extra_js: String = files
        .iter()
        .filter(|f| util::extension(&f.name).as_deref() == Some("js") && !inlined.contains(&f.name))
        .map(|f| format!("<script>\n// {}\n{}</script>\n", f.name, escape_inline_script(&f.content)))
        .collect();

    let loads_engine = html.contains(&config.styling_engine_url) || html.to_ascii_lowercase().contains("tailwindcss");
    let mut head_extra = String::new();
    if !loads_engine {
        head_extra.push_str(&templates::styling_engine_tag(config));
        head_extra.push('\n');
    }
    head_extra.push_str(&extra_css);

    if !head_extra.is_empty() && !insert_before(&mut html, "</head>", &head_extra) {
        html.insert_str(0, &head_extra);
    }
    if !extra_js.is_empty() && !insert_before(&mut html, "</body>", &extra_js) {
        html.push_str(&extra_js);
    }
    html
}

/// URL of the hosted runner with the entry file passed as a parameter.
pub fn runner_url(config: &PreviewConfig, entry: &ProjectFile) -> String {
    format!(
        "{}?code={}&name={}&platform=web&preview=true&theme=light",
        config.runner_embed_url,
        urlencoding::encode(&entry.content),
        urlencoding::encode(&entry.name),
    )
}

/// Standalone page framing the hosted runner, for writing to disk.
pub fn runner_document(url: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <title>Preview</title>
    <style>html, body, iframe {{ margin: 0; width: 100%; height: 100%; border: 0; }}</style>
  </head>
  <body>
    <iframe src="{}" allow="accelerometer; gyroscope"></iframe>
  </body>
</html>
"#,
        escape_html(url)
    )
}
