use std::sync::Arc;

use anyhow::{Context, Result};

use patchbay_registry::{Command, IMAGE_COMMAND};
use patchbay_types::{Args, CommandOutcome};

use crate::traits::ImageStore;

const IMAGE_PROXY_DOC: &str = r#"Gets an image from the cache, resized when dimensions are given.

```
Required parameters:
    img (str):          Path or identifier of the image

Optional parameters:
    width (int):        Width to scale the image to
    height (int):       Height to scale the image to

Returns:
    binary:             Raw jpeg bytes
```"#;

pub(crate) fn command(images: Arc<dyn ImageStore>) -> Command {
    Command::new(IMAGE_COMMAND, move |args| image_proxy(images.as_ref(), args))
        .with_doc(IMAGE_PROXY_DOC)
        .with_params(&["img", "width", "height"])
}

fn image_proxy(images: &dyn ImageStore, args: &Args) -> Result<CommandOutcome> {
    let Some(img) = args.str_arg("img").filter(|img| !img.is_empty()) else {
        return Ok(CommandOutcome::failed("Parameter img is required"));
    };
    let width = args.u32_arg("width");
    let height = args.u32_arg("height");
    let bytes = images
        .fetch(&img, width, height)
        .with_context(|| format!("fetching image {img:?}"))?;
    Ok(CommandOutcome::data(bytes))
}
