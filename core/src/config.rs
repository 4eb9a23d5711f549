/*
 * config.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Mailcode, a mailbox verification-code relay.
 *
 * Mailcode is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Mailcode is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Mailcode.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Relay configuration in ~/.mailcode/config.xml. All XML read/write uses the quick_xml
//! reader/writer. A missing file, and any element left out, take the defaults.

use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::error::{Error, Result};
use crate::mail::{MailFilter, IMAPS_PORT};

const ROOT: &[u8] = b"mailcode";

/// Default config directory: ~/.mailcode. Falls back to the working directory without HOME.
pub fn default_config_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .map(|h| h.join(".mailcode"))
        .unwrap_or_else(|| PathBuf::from(".mailcode"))
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.xml")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding accounts.json and usage.json.
    pub data_dir: PathBuf,
    pub imap_port: u16,
    pub mail: MailFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_config_dir(),
            imap_port: IMAPS_PORT,
            mail: MailFilter::default(),
        }
    }
}

impl Config {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("[config] {} not found, using defaults", path.display());
                return Ok(Config::default());
            }
            Err(e) => return Err(Error::config(format!("{}: {}", path.display(), e))),
        };
        Self::from_xml(&content)
    }

    /// Parse `<mailcode>` XML. Unknown elements are ignored.
    pub fn from_xml(content: &str) -> Result<Self> {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);
        let mut config = Config::default();
        let mut path: Vec<Vec<u8>> = Vec::new();

        loop {
            match reader.read_event() {
                Err(e) => return Err(Error::config(format!("XML parse error: {}", e))),
                Ok(Event::Eof) => break,
                Ok(Event::Start(e)) => {
                    if path.is_empty() && e.name().as_ref() != ROOT {
                        return Err(Error::config("root element must be <mailcode>"));
                    }
                    path.push(e.name().as_ref().to_vec());
                }
                Ok(Event::Empty(e)) if path.is_empty() && e.name().as_ref() != ROOT => {
                    return Err(Error::config("root element must be <mailcode>"));
                }
                Ok(Event::End(_)) => {
                    path.pop();
                }
                Ok(Event::Text(e)) => {
                    let text = e.unescape().map_err(|e| Error::config(e.to_string()))?;
                    let text = text.trim();
                    let keys: Vec<&[u8]> = path.iter().map(Vec::as_slice).collect();
                    match keys.as_slice() {
                        [ROOT, b"data-dir"] => config.data_dir = PathBuf::from(text),
                        [ROOT, b"imap-port"] => {
                            config.imap_port = text
                                .parse()
                                .map_err(|_| Error::config(format!("invalid imap-port: {}", text)))?;
                        }
                        [ROOT, b"mail", b"sender"] => config.mail.sender = text.to_string(),
                        [ROOT, b"mail", b"sentinel"] => config.mail.sentinel = text.to_string(),
                        [ROOT, b"mail", b"code-selector"] => config.mail.code_selector = text.to_string(),
                        _ => {}
                    }
                }
                _ => {}
            }
        }
        config
            .mail
            .selector()
            .map_err(|e| Error::config(format!("code-selector: {}", e)))?;
        Ok(config)
    }

    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut writer = Writer::new_with_indent(&mut out, b' ', 2);
        let data_dir = self.data_dir.to_string_lossy();
        let port = self.imap_port.to_string();
        write_xml(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        write_xml(&mut writer, Event::Start(BytesStart::new("mailcode")))?;
        write_element(&mut writer, "data-dir", &data_dir)?;
        write_element(&mut writer, "imap-port", &port)?;
        write_xml(&mut writer, Event::Start(BytesStart::new("mail")))?;
        write_element(&mut writer, "sender", &self.mail.sender)?;
        write_element(&mut writer, "sentinel", &self.mail.sentinel)?;
        write_element(&mut writer, "code-selector", &self.mail.code_selector)?;
        write_xml(&mut writer, Event::End(BytesEnd::new("mail")))?;
        write_xml(&mut writer, Event::End(BytesEnd::new("mailcode")))?;
        Ok(out)
    }

    /// Write to `path`, creating the parent directory.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::config(e.to_string()))?;
        }
        fs::write(path, self.to_xml()?).map_err(|e| Error::config(format!("{}: {}", path.display(), e)))
    }
}

fn write_xml(writer: &mut Writer<&mut Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer.write_event(event).map_err(|e| Error::config(e.to_string()))
}

fn write_element(writer: &mut Writer<&mut Vec<u8>>, name: &str, text: &str) -> Result<()> {
    write_xml(writer, Event::Start(BytesStart::new(name)))?;
    write_xml(writer, Event::Text(BytesText::new(text)))?;
    write_xml(writer, Event::End(BytesEnd::new(name)))
}
