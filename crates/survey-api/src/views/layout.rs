use maud::{DOCTYPE, Markup, PreEscaped, html};
use survey_db::models::UserRow;

const HTMX_SRC: &str = "https://unpkg.com/htmx.org@1.9.12";
const PLOTLY_SRC: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; margin: 0; background: #f5f6f8; color: #1d2330; }
nav { display: flex; gap: 1rem; align-items: center; padding: .75rem 1.5rem; background: #1d2330; }
nav a { color: #e8ebf2; text-decoration: none; }
nav .spacer { flex: 1; }
main { max-width: 1100px; margin: 1.5rem auto; padding: 0 1rem; }
.card { background: #fff; border-radius: 8px; padding: 1rem 1.25rem; margin-bottom: 1rem; box-shadow: 0 1px 3px rgba(0,0,0,.08); }
.grid { display: grid; grid-template-columns: repeat(auto-fit, minmax(260px, 1fr)); gap: 1rem; }
.tag { display: inline-block; background: #e3e8f4; border-radius: 4px; padding: 0 .4rem; margin-right: .25rem; font-size: .85rem; }
.error { color: #b3261e; }
.banner { background: #e6f4ea; border: 1px solid #b7dfc2; padding: .5rem .75rem; border-radius: 6px; }
.muted { color: #6b7280; }
table { border-collapse: collapse; width: 100%; }
th, td { border-bottom: 1px solid #e5e7eb; padding: .35rem .5rem; text-align: left; font-size: .9rem; }
label { display: block; margin: .5rem 0 .2rem; }
input[type=text], input[type=email], input[type=password], input[type=date], select, textarea { width: 100%; padding: .4rem; box-sizing: border-box; }
button, .button { padding: .4rem .9rem; border: 0; border-radius: 6px; background: #3056d3; color: #fff; cursor: pointer; text-decoration: none; }
button.danger { background: #b3261e; }
#toasts { position: fixed; right: 1rem; bottom: 1rem; display: flex; flex-direction: column; gap: .5rem; }
.toast { padding: .6rem 1rem; border-radius: 6px; color: #fff; background: #374151; }
.toast.success { background: #1e7b34; }
.toast.error { background: #b3261e; }
"#;

const TOAST_SCRIPT: &str = r#"
document.body.addEventListener('showToast', function (evt) {
  var box = document.getElementById('toasts');
  var el = document.createElement('div');
  el.className = 'toast ' + (evt.detail.level || 'info');
  el.textContent = evt.detail.message;
  box.appendChild(el);
  setTimeout(function () { el.remove(); }, 4000);
});
document.body.addEventListener('tableChanged', function () {
  var grid = document.getElementById('table-grid');
  if (grid) { htmx.trigger(grid, 'refresh'); }
});
"#;

/// What every full page needs to know about the visitor.
#[derive(Debug, Clone, Copy)]
pub struct PageContext<'a> {
    pub user: Option<&'a UserRow>,
    pub csrf_token: &'a str,
}

impl<'a> PageContext<'a> {
    pub fn new(user: Option<&'a UserRow>, csrf_token: &'a str) -> Self {
        Self { user, csrf_token }
    }

    pub fn anonymous() -> PageContext<'static> {
        PageContext {
            user: None,
            csrf_token: "",
        }
    }

    fn is_admin(&self) -> bool {
        self.user.is_some_and(UserRow::is_admin)
    }
}

pub fn page(title: &str, ctx: PageContext<'_>, body: Markup) -> Markup {
    render(title, ctx, false, body)
}

/// Full page that also loads Plotly.
pub fn chart_page(title: &str, ctx: PageContext<'_>, body: Markup) -> Markup {
    render(title, ctx, true, body)
}

fn render(title: &str, ctx: PageContext<'_>, with_charts: bool, body: Markup) -> Markup {
    // Every HTMX request echoes the CSRF cookie back as a header
    let hx_headers = serde_json::json!({ "X-CSRF-Token": ctx.csrf_token }).to_string();

    html! {
        (DOCTYPE)
        html lang="ru" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) " | Опросы" }
                script src=(HTMX_SRC) {}
                @if with_charts {
                    script src=(PLOTLY_SRC) {}
                }
                style { (PreEscaped(STYLE)) }
            }
            body hx-headers=(hx_headers) {
                nav {
                    a href="/" { "Главная" }
                    @if ctx.user.is_some() {
                        a href="/surveys/create" { "Создать опрос" }
                    }
                    @if ctx.is_admin() {
                        a href="/admin/analytics" { "Аналитика" }
                        a href="/admin/tables_view" { "Таблицы" }
                    }
                    span.spacer {}
                    @match ctx.user {
                        Some(user) => {
                            a href="/users/me" { (user.full_name) }
                            a href="/logout" { "Выход" }
                        }
                        None => {
                            a href="/login" { "Вход" }
                            a href="/register" { "Регистрация" }
                        }
                    }
                }
                main { (body) }
                div #toasts {}
                script { (PreEscaped(TOAST_SCRIPT)) }
            }
        }
    }
}
