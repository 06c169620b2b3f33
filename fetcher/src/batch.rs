use anyhow::{bail, Context, Result};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Action kind of the batch steps that consume the downloaded data files.
const IMPORT_ACTION: &str = "ImportASCII";

/// Where a step's `<Param>` value lives in the event stream.
enum ParamSlot {
    /// Index of the text node inside `<Param>...</Param>`.
    Text(usize),
    /// Index of `</Param>` when the element has no text node.
    BeforeEnd(usize),
    /// Index of a self-closing `<Param/>`.
    Empty(usize),
}

struct StepInfo {
    action: Option<String>,
    param: Option<ParamSlot>,
}

enum Rewrite {
    ReplaceText(String),
    InsertBeforeEnd(String),
    FillEmpty(String),
}

/// Rewrite the batch file so its ImportASCII steps point at the data files,
/// paired positionally. Returns the number of rewritten steps. On a count
/// mismatch the file is left untouched.
pub fn rewrite_import_steps(batch_file: &Path, data_files: &[PathBuf]) -> Result<usize> {
    let xml = fs::read_to_string(batch_file)
        .with_context(|| format!("Failed to read batch file \"{}\"", batch_file.display()))?;

    let mut params = Vec::with_capacity(data_files.len());
    for file in data_files {
        let absolute = fs::canonicalize(file)
            .with_context(|| format!("Failed to resolve data file \"{}\"", file.display()))?;
        let param = escape_separators(&absolute.to_string_lossy());
        debug!("{param}");
        params.push(param);
    }

    let rewritten = rewrite_steps(&xml, &params)?;
    fs::write(batch_file, rewritten)
        .with_context(|| format!("Failed to write batch file \"{}\"", batch_file.display()))?;
    Ok(params.len())
}

/// Pure rewrite core: pair the ImportASCII steps of the document with the
/// param values by position and return the updated document. Everything
/// outside the rewritten `Param` text nodes round-trips unchanged.
pub fn rewrite_steps(xml: &str, params: &[String]) -> Result<String> {
    let events = read_events(xml)?;
    let steps = collect_steps(&events)?;

    let mut import_params = Vec::new();
    for step in &steps {
        if step.action.as_deref() == Some(IMPORT_ACTION) {
            match &step.param {
                Some(slot) => import_params.push(slot),
                None => bail!("Found an {IMPORT_ACTION} step without a Param element"),
            }
        }
    }
    if import_params.len() != params.len() {
        bail!(
            "Number of ascii files ({}) is not equal to number of ascii import actions ({})",
            params.len(),
            import_params.len()
        );
    }

    let mut rewrites = HashMap::new();
    for (slot, value) in import_params.into_iter().zip(params) {
        match slot {
            ParamSlot::Text(index) => rewrites.insert(*index, Rewrite::ReplaceText(value.clone())),
            ParamSlot::BeforeEnd(index) => {
                rewrites.insert(*index, Rewrite::InsertBeforeEnd(value.clone()))
            }
            ParamSlot::Empty(index) => rewrites.insert(*index, Rewrite::FillEmpty(value.clone())),
        };
    }

    write_events(events, &rewrites)
}

/// Double backslashes, the escape AmiBroker expects in batch params.
pub fn escape_separators(path: &str) -> String {
    path.replace('\\', "\\\\")
}

fn read_events(xml: &str) -> Result<Vec<Event<'_>>> {
    let mut reader = Reader::from_str(xml);
    let mut events = Vec::new();
    loop {
        match reader.read_event().context("Failed to parse batch file XML")? {
            Event::Eof => break,
            event => events.push(event),
        }
    }
    Ok(events)
}

fn collect_steps(events: &[Event]) -> Result<Vec<StepInfo>> {
    let mut steps = Vec::new();
    let mut in_step = false;
    let mut in_action = false;
    let mut in_param = false;
    let mut action: Option<String> = None;
    let mut param: Option<ParamSlot> = None;

    for (index, event) in events.iter().enumerate() {
        match event {
            Event::Start(e) => match e.name().as_ref() {
                b"Step" => {
                    in_step = true;
                    action = None;
                    param = None;
                }
                b"Action" if in_step => in_action = true,
                b"Param" if in_step => in_param = true,
                _ => {}
            },
            Event::Text(e) if in_action => {
                let text = e.unescape().context("Failed to decode Action text")?;
                action = Some(text.trim().to_string());
            }
            Event::Text(_) if in_param => {
                if param.is_none() {
                    param = Some(ParamSlot::Text(index));
                }
            }
            Event::Empty(e) if in_step && e.name().as_ref() == b"Param" => {
                param = Some(ParamSlot::Empty(index));
            }
            Event::End(e) => match e.name().as_ref() {
                b"Action" => in_action = false,
                b"Param" => {
                    if param.is_none() {
                        param = Some(ParamSlot::BeforeEnd(index));
                    }
                    in_param = false;
                }
                b"Step" => {
                    in_step = false;
                    steps.push(StepInfo {
                        action: action.take(),
                        param: param.take(),
                    });
                }
                _ => {}
            },
            _ => {}
        }
    }
    Ok(steps)
}

fn write_events(events: Vec<Event>, rewrites: &HashMap<usize, Rewrite>) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    for (index, event) in events.into_iter().enumerate() {
        match rewrites.get(&index) {
            Some(Rewrite::ReplaceText(value)) => {
                writer.write_event(Event::Text(BytesText::new(value)))?;
            }
            Some(Rewrite::InsertBeforeEnd(value)) => {
                writer.write_event(Event::Text(BytesText::new(value)))?;
                writer.write_event(event)?;
            }
            Some(Rewrite::FillEmpty(value)) => {
                writer.write_event(Event::Start(BytesStart::new("Param")))?;
                writer.write_event(Event::Text(BytesText::new(value)))?;
                writer.write_event(Event::End(BytesEnd::new("Param")))?;
            }
            None => writer.write_event(event)?,
        }
    }
    String::from_utf8(writer.into_inner()).context("Batch file rewrite produced invalid UTF-8")
}
