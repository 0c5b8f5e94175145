use tera::{Context, Tera};

use crate::model::{Filter, Todo};

const FILTERS: [&str; 3] = ["all", "active", "completed"];

/// HTML renderer for the full page and the fragments htmx swaps in.
pub struct Views {
    tera: Tera,
}

impl Views {
    pub fn new() -> tera::Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("index.html", include_str!("../templates/index.html")),
            ("list.html", include_str!("../templates/list.html")),
            ("item.html", include_str!("../templates/item.html")),
        ])?;
        Ok(Views { tera })
    }

    pub fn index(&self, todos: &[Todo], filter: Filter) -> tera::Result<String> {
        let mut context = Context::new();
        context.insert("todos", todos);
        context.insert("filter", filter.as_str());
        context.insert("filters", &FILTERS);
        self.tera.render("index.html", &context)
    }

    pub fn list(&self, todos: &[Todo]) -> tera::Result<String> {
        let mut context = Context::new();
        context.insert("todos", todos);
        self.tera.render("list.html", &context)
    }

    pub fn item(&self, todo: &Todo) -> tera::Result<String> {
        let mut context = Context::new();
        context.insert("todo", todo);
        self.tera.render("item.html", &context)
    }
}
