//! Server-rendered pages.
//!
//! Templates are compiled into the binary and registered with minijinja at startup. Names end
//! in `.html`, which turns on minijinja's HTML auto-escaping for everything they interpolate.

use axum::response::Html;
use minijinja::Environment;
use serde::Serialize;
use tracing::error;

use crate::errors::Error;

const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../templates/base.html")),
    ("students.html", include_str!("../templates/students.html")),
    ("register.html", include_str!("../templates/register.html")),
    ("login.html", include_str!("../templates/login.html")),
    ("profile.html", include_str!("../templates/profile.html")),
    ("student_password.html", include_str!("../templates/student_password.html")),
    ("student_detail.html", include_str!("../templates/student_detail.html")),
    ("upload_excel.html", include_str!("../templates/upload_excel.html")),
    ("edit_student.html", include_str!("../templates/edit_student.html")),
];

pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    pub fn new() -> Result<Self, Error> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);

        for &(name, source) in TEMPLATES {
            env.add_template(name, source).map_err(|e| Error::Internal {
                operation: format!("register template '{name}': {e}"),
            })?;
        }

        Ok(Self { env })
    }

    /// Render a page with the given context
    pub fn render<C: Serialize>(&self, name: &str, context: C) -> Result<Html<String>, Error> {
        let template = self.env.get_template(name).map_err(|e| Error::Internal {
            operation: format!("find template '{name}': {e}"),
        })?;

        template.render(context).map(Html).map_err(|e| {
            error!("Failed to render template '{name}': {e:#}");
            Error::Internal {
                operation: format!("render template '{name}'"),
            }
        })
    }
}
