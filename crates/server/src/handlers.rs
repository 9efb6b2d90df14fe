//! Built-in request handlers
//!
//! Each handler decodes its complete payload first and only then applies
//! it, so an `Incomplete` read never leaves half an update behind.

use bytes::BytesMut;
use shadowvm_protocol::{
    ClassInfo, Invocation, NewClass, ObjectFree, RegisterAnalysis, RequestTag, StringInfo,
    ThreadInfo, WireReader,
};

use crate::dispatch::RequestHandler;
use crate::error::Result;
use crate::session::SessionState;

/// Handler for a built-in tag
pub fn standard(tag: RequestTag) -> RequestHandler {
    match tag {
        RequestTag::Close => RequestHandler {
            name: "close",
            handle: close,
            exit: None,
        },
        RequestTag::Analyze => RequestHandler {
            name: "analyze",
            handle: analyze,
            exit: Some(analyze_exit),
        },
        RequestTag::ObjectFree => RequestHandler {
            name: "object_free",
            handle: object_free,
            exit: None,
        },
        RequestTag::NewClass => RequestHandler {
            name: "new_class",
            handle: new_class,
            exit: Some(new_class_exit),
        },
        RequestTag::ClassInfo => RequestHandler {
            name: "class_info",
            handle: class_info,
            exit: None,
        },
        RequestTag::StringInfo => RequestHandler {
            name: "string_info",
            handle: string_info,
            exit: None,
        },
        RequestTag::RegisterAnalysis => RequestHandler {
            name: "register_analysis",
            handle: register_analysis,
            exit: None,
        },
        RequestTag::ThreadInfo => RequestHandler {
            name: "thread_info",
            handle: thread_info,
            exit: None,
        },
    }
}

fn close(_: &mut WireReader<'_>, _: &mut BytesMut, state: &mut SessionState, _: bool) -> Result<()> {
    state.request_close();
    Ok(())
}

fn analyze(reader: &mut WireReader<'_>, _: &mut BytesMut, state: &mut SessionState, debug: bool) -> Result<()> {
    let invocation = Invocation::decode(reader)?;
    if debug {
        tracing::debug!(
            session_id = state.id,
            event_id = %invocation.event_id,
            args = invocation.args.len(),
            inline = invocation.specials.len(),
            "analyze"
        );
    }
    state.analyses.invoke(&invocation, &mut state.shadows)
}

fn analyze_exit(state: &mut SessionState) {
    state.analyses.at_exit();
}

fn object_free(reader: &mut WireReader<'_>, _: &mut BytesMut, state: &mut SessionState, debug: bool) -> Result<()> {
    let ObjectFree { refs } = ObjectFree::decode(reader)?;
    if debug {
        tracing::debug!(session_id = state.id, count = refs.len(), "object free");
    }
    for net_ref in refs {
        match state.shadows.free(net_ref) {
            Some(entry) => state.analyses.object_free(&entry),
            None => tracing::trace!(session_id = state.id, net_ref = %net_ref, "free of unknown reference"),
        }
    }
    Ok(())
}

fn new_class(reader: &mut WireReader<'_>, _: &mut BytesMut, state: &mut SessionState, debug: bool) -> Result<()> {
    let class = NewClass::decode(reader)?;
    if debug {
        tracing::debug!(
            session_id = state.id,
            class = class.name,
            loader = %class.loader,
            code_len = class.code.len(),
            "new class"
        );
    }
    state.shadows.register_class(class.name, class.loader, class.code);
    Ok(())
}

fn new_class_exit(state: &mut SessionState) {
    tracing::debug!(
        session_id = state.id,
        classes = state.shadows.class_count(),
        bound_classes = state.shadows.bound_class_count(),
        objects = state.shadows.object_count(),
        "shadow table at session end"
    );
}

fn class_info(reader: &mut WireReader<'_>, _: &mut BytesMut, state: &mut SessionState, debug: bool) -> Result<()> {
    let info = ClassInfo::decode(reader)?;
    if debug {
        tracing::debug!(
            session_id = state.id,
            class = info.name,
            class_id = info.class_ref.class_id(),
            "class info"
        );
    }
    state
        .shadows
        .bind_class(info.class_ref, info.name, info.loader, info.superclass)?;
    Ok(())
}

fn string_info(reader: &mut WireReader<'_>, _: &mut BytesMut, state: &mut SessionState, debug: bool) -> Result<()> {
    let info = StringInfo::decode(reader)?;
    if debug {
        tracing::debug!(session_id = state.id, net_ref = %info.net_ref, "string info");
    }
    state.shadows.register_string(info.net_ref, info.value)?;
    Ok(())
}

fn register_analysis(
    reader: &mut WireReader<'_>,
    _: &mut BytesMut,
    state: &mut SessionState,
    debug: bool,
) -> Result<()> {
    let registration = RegisterAnalysis::decode(reader)?;
    if debug {
        tracing::debug!(
            session_id = state.id,
            event_id = %registration.event_id,
            method = registration.method,
            "register analysis"
        );
    }
    state
        .analyses
        .register(registration.event_id, registration.method)
}

fn thread_info(reader: &mut WireReader<'_>, _: &mut BytesMut, state: &mut SessionState, debug: bool) -> Result<()> {
    let info = ThreadInfo::decode(reader)?;
    if debug {
        tracing::debug!(
            session_id = state.id,
            net_ref = %info.net_ref,
            name = info.name,
            daemon = info.daemon,
            "thread info"
        );
    }
    state
        .shadows
        .register_thread(info.net_ref, info.name, info.daemon)?;
    Ok(())
}
