//! Product catalogue uploads: multipart forms relayed to the API
//!
//! The browser's multipart form is read field by field and rebuilt as a
//! `reqwest` multipart form, so the image bytes reach the API with their
//! original file name and content type.

use api_gateway::multipart::{Form, Part};
use api_gateway::{ApiRequest, Gateway, Outcome};
use axum::extract::Multipart;
use axum::response::{IntoResponse, Json, Response};
use axum_extra::extract::CookieJar;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::auth::{SessionSettings, redirect_to_login};
use crate::cookies::CookieJarStore;
use crate::error::{Error, Result};

/// Largest multipart body accepted on the upload routes.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

const IMAGE_REQUIRED: &str = "Product image is required";
const NAME_REQUIRED: &str = "Product name is required";
const PRICE_REQUIRED: &str = "Valid price is required";
const STOCK_REQUIRED: &str = "Valid stock is required";
const INVALID_PRODUCT_ID: &str = "Invalid product id";

/// An uploaded file, held in memory until it is forwarded.
#[derive(Debug)]
struct ImageFile {
    file_name: Option<String>,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

/// Fields of the product form. Unknown fields are ignored.
#[derive(Debug, Default)]
struct ProductFields {
    image: Option<ImageFile>,
    name: Option<String>,
    price: Option<String>,
    stock: Option<String>,
}

impl ProductFields {
    async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut fields = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(invalid_form)? {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some("image") => {
                    let file_name = field.file_name().map(str::to_string);
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await.map_err(invalid_form)?;
                    fields.image = Some(ImageFile {
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
                Some("name") => fields.name = Some(field.text().await.map_err(invalid_form)?),
                Some("price") => fields.price = Some(field.text().await.map_err(invalid_form)?),
                Some("stock") => fields.stock = Some(field.text().await.map_err(invalid_form)?),
                other => debug!(field = ?other, "ignoring form field"),
            }
        }
        Ok(fields)
    }

    /// A new product needs every field, including a non-empty image.
    fn into_create_form(self) -> Result<Form> {
        let image = require(self.image.filter(|i| !i.bytes.is_empty()), IMAGE_REQUIRED)?;
        let name = require(non_blank(self.name), NAME_REQUIRED)?;
        let price = require(numeric(self.price), PRICE_REQUIRED)?;
        let stock = require(numeric(self.stock), STOCK_REQUIRED)?;

        Ok(Form::new()
            .part("image", image_part(image)?)
            .text("name", name)
            .text("price", price)
            .text("stock", stock))
    }

    /// An update needs a stock level; the other fields are sent only when
    /// they carry a value.
    fn into_update_form(self) -> Result<Form> {
        let stock = require(numeric(self.stock), STOCK_REQUIRED)?;
        let mut form = Form::new().text("stock", stock);
        if let Some(image) = self.image.filter(|image| !image.bytes.is_empty()) {
            form = form.part("image", image_part(image)?);
        }
        if let Some(name) = non_blank(self.name) {
            form = form.text("name", name);
        }
        if let Some(price) = numeric(self.price) {
            form = form.text("price", price);
        }
        Ok(form)
    }
}

fn invalid_form(err: axum::extract::multipart::MultipartError) -> Error {
    Error::Validation(format!("invalid multipart form: {err}"))
}

fn require<T>(value: Option<T>, message: &str) -> Result<T> {
    value.ok_or_else(|| Error::Validation(message.into()))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Trimmed value, when it parses as a finite number.
fn numeric(value: Option<String>) -> Option<String> {
    non_blank(value).filter(|v| v.parse::<f64>().is_ok_and(f64::is_finite))
}

fn image_part(image: ImageFile) -> Result<Part> {
    let file_name = image.file_name.unwrap_or_else(|| "image".to_string());
    let part = Part::bytes(image.bytes).file_name(file_name);
    match image.content_type {
        Some(content_type) => part
            .mime_str(&content_type)
            .map_err(|e| Error::Validation(format!("invalid image content type: {e}"))),
        None => Ok(part),
    }
}

/// Path segment safe to splice into `/products/{id}`.
fn product_id(id: &str) -> Result<&str> {
    let plain = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_';
    if !id.is_empty() && id.chars().all(plain) {
        Ok(id)
    } else {
        Err(Error::Validation(INVALID_PRODUCT_ID.into()))
    }
}

#[instrument(skip_all, fields(request_id = %request_id))]
pub async fn create_product(
    gateway: &Gateway,
    settings: &SessionSettings,
    jar: CookieJar,
    multipart: Multipart,
    request_id: &str,
) -> Response {
    match try_create_product(gateway, settings, jar, multipart).await {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, status = err.status().as_u16(), "product upload failed");
            err.render(request_id)
        }
    }
}

async fn try_create_product(
    gateway: &Gateway,
    settings: &SessionSettings,
    jar: CookieJar,
    multipart: Multipart,
) -> Result<Response> {
    let form = ProductFields::read(multipart).await?.into_create_form()?;
    send(gateway, settings, jar, ApiRequest::post("/products"), form).await
}

#[instrument(skip_all, fields(request_id = %request_id, product_id = %id))]
pub async fn update_product(
    gateway: &Gateway,
    settings: &SessionSettings,
    jar: CookieJar,
    id: &str,
    multipart: Multipart,
    request_id: &str,
) -> Response {
    match try_update_product(gateway, settings, jar, id, multipart).await {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, status = err.status().as_u16(), "product update failed");
            err.render(request_id)
        }
    }
}

async fn try_update_product(
    gateway: &Gateway,
    settings: &SessionSettings,
    jar: CookieJar,
    id: &str,
    multipart: Multipart,
) -> Result<Response> {
    let id = product_id(id)?;
    let form = ProductFields::read(multipart).await?.into_update_form()?;
    let request = ApiRequest::put(format!("/products/{id}"));
    send(gateway, settings, jar, request, form).await
}

/// Attach the form and the session, call the API and shape the result for
/// the browser.
async fn send(
    gateway: &Gateway,
    settings: &SessionSettings,
    jar: CookieJar,
    request: ApiRequest<'static>,
    form: Form,
) -> Result<Response> {
    let store = CookieJarStore::new(jar);
    let request = request.multipart(form).credentials(&store);
    let outcome = gateway.call(request).await?;

    let payload = match outcome {
        Outcome::Success(payload) => payload,
        Outcome::Redirect(reason) => {
            return Ok((store.into_jar(), redirect_to_login(reason, settings)).into_response());
        }
    };
    info!("product saved");
    let body = json!({ "success": true, "data": payload });
    Ok((store.into_jar(), Json(body)).into_response())
}
