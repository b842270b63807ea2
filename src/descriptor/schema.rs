//! Raw shape of `WEB-INF/web.xml`, read off the element tree.
//!
//! ```xml
//! <web-app id="shop" version="3.1">
//!   <display-name>Shop</display-name>
//!   <servlet>
//!     <servlet-name>catalog</servlet-name>
//!     <servlet-class>shop.Catalog</servlet-class>
//!     <init-param>
//!       <param-name>page-size</param-name>
//!       <param-value>20</param-value>
//!     </init-param>
//!   </servlet>
//!   <servlet-mapping>
//!     <servlet-name>catalog</servlet-name>
//!     <url-pattern>/catalog/*</url-pattern>
//!     <url-pattern>/items/*</url-pattern>
//!   </servlet-mapping>
//!   <welcome-file-list>
//!     <welcome-file>index.html</welcome-file>
//!   </welcome-file-list>
//! </web-app>
//! ```
//!
//! Element names are matched on their local name, so a namespaced
//! `<web-app xmlns="...">` reads the same as a bare one.

use roxmltree::Node;

/// A required child element was absent, or a value did not parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ShapeError {
    Missing { parent: &'static str, child: &'static str },
    Invalid { element: &'static str, value: String },
}

#[derive(Debug, Default)]
pub(crate) struct RawDescriptor {
    pub id: Option<String>,
    pub version: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub servlet: Vec<RawServlet>,
    pub servlet_mapping: Vec<RawServletMapping>,
    pub filter: Vec<RawFilter>,
    pub filter_mapping: Vec<RawFilterMapping>,
    pub listener: Vec<RawListener>,
    pub context_param: Vec<RawParam>,
    pub error_page: Vec<RawErrorPage>,
    pub welcome_file_list: Option<RawWelcomeFileList>,
    pub session_timeout: Option<u32>,
    /// Unrecognized top-level element names, in document order.
    pub unknown: Vec<String>,
}

#[derive(Debug)]
pub(crate) struct RawServlet {
    pub servlet_name: String,
    pub servlet_class: String,
    pub init_param: Vec<RawParam>,
}

#[derive(Debug)]
pub(crate) struct RawFilter {
    pub filter_name: String,
    pub filter_class: String,
    pub init_param: Vec<RawParam>,
}

#[derive(Debug)]
pub(crate) struct RawParam {
    pub param_name: String,
    pub param_value: String,
}

#[derive(Debug)]
pub(crate) struct RawServletMapping {
    pub servlet_name: String,
    pub url_pattern: Vec<String>,
}

#[derive(Debug)]
pub(crate) struct RawFilterMapping {
    pub filter_name: String,
    pub url_pattern: Vec<String>,
    pub servlet_name: Vec<String>,
}

#[derive(Debug)]
pub(crate) struct RawListener {
    pub listener_class: String,
}

#[derive(Debug)]
pub(crate) struct RawErrorPage {
    pub error_code: Option<u16>,
    pub exception_type: Option<String>,
    pub location: String,
}

#[derive(Debug)]
pub(crate) struct RawWelcomeFileList {
    pub welcome_file: Vec<String>,
}

impl RawDescriptor {
    /// Read the children of the document element.
    pub fn from_root(root: Node<'_, '_>) -> Result<Self, ShapeError> {
        let mut raw = RawDescriptor {
            id: root.attribute("id").map(str::to_string),
            version: root.attribute("version").map(str::to_string),
            ..Default::default()
        };

        for element in elements(root) {
            match element.tag_name().name() {
                "servlet" => raw.servlet.push(RawServlet {
                    servlet_name: required(element, "servlet", "servlet-name")?,
                    servlet_class: required(element, "servlet", "servlet-class")?,
                    init_param: init_params(element)?,
                }),
                "filter" => raw.filter.push(RawFilter {
                    filter_name: required(element, "filter", "filter-name")?,
                    filter_class: required(element, "filter", "filter-class")?,
                    init_param: init_params(element)?,
                }),
                "servlet-mapping" => raw.servlet_mapping.push(RawServletMapping {
                    servlet_name: required(element, "servlet-mapping", "servlet-name")?,
                    url_pattern: texts(element, "url-pattern"),
                }),
                "filter-mapping" => raw.filter_mapping.push(RawFilterMapping {
                    filter_name: required(element, "filter-mapping", "filter-name")?,
                    url_pattern: texts(element, "url-pattern"),
                    servlet_name: texts(element, "servlet-name"),
                }),
                "listener" => raw.listener.push(RawListener {
                    listener_class: required(element, "listener", "listener-class")?,
                }),
                "context-param" => raw.context_param.push(param(element, "context-param")?),
                "error-page" => raw.error_page.push(RawErrorPage {
                    error_code: text(element, "error-code")
                        .map(|code| {
                            code.parse().map_err(|_| ShapeError::Invalid {
                                element: "error-code",
                                value: code,
                            })
                        })
                        .transpose()?,
                    exception_type: text(element, "exception-type"),
                    location: required(element, "error-page", "location")?,
                }),
                "welcome-file-list" => {
                    let files = texts(element, "welcome-file");
                    match raw.welcome_file_list.as_mut() {
                        Some(list) => list.welcome_file.extend(files),
                        None => raw.welcome_file_list = Some(RawWelcomeFileList { welcome_file: files }),
                    }
                }
                "display-name" => raw.display_name = Some(own_text(element)),
                "description" => raw.description = Some(own_text(element)),
                "session-config" => {
                    raw.session_timeout = text(element, "session-timeout")
                        .map(|minutes| {
                            minutes.parse().map_err(|_| ShapeError::Invalid {
                                element: "session-timeout",
                                value: minutes,
                            })
                        })
                        .transpose()?;
                }
                other => raw.unknown.push(other.to_string()),
            }
        }
        Ok(raw)
    }
}

fn elements<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|child| child.is_element())
}

/// Trimmed text of `node`, empty when it has none.
fn own_text(node: Node<'_, '_>) -> String {
    node.text().unwrap_or_default().trim().to_string()
}

fn text(node: Node<'_, '_>, child: &str) -> Option<String> {
    elements(node)
        .find(|element| element.tag_name().name() == child)
        .map(own_text)
}

fn texts(node: Node<'_, '_>, child: &str) -> Vec<String> {
    elements(node)
        .filter(|element| element.tag_name().name() == child)
        .map(own_text)
        .collect()
}

fn required(node: Node<'_, '_>, parent: &'static str, child: &'static str) -> Result<String, ShapeError> {
    text(node, child).ok_or(ShapeError::Missing { parent, child })
}

fn param(node: Node<'_, '_>, parent: &'static str) -> Result<RawParam, ShapeError> {
    Ok(RawParam {
        param_name: required(node, parent, "param-name")?,
        param_value: text(node, "param-value").unwrap_or_default(),
    })
}

fn init_params(node: Node<'_, '_>) -> Result<Vec<RawParam>, ShapeError> {
    elements(node)
        .filter(|element| element.tag_name().name() == "init-param")
        .map(|element| param(element, "init-param"))
        .collect()
}
