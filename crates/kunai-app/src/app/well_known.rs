//! RFC 6764 well-known redirects.

use salvo::writing::Redirect;
use salvo::{Depot, Request, Response, handler};

use crate::state::state_from_depot;

fn redirect_to_prefix(depot: &Depot, res: &mut Response) {
    let target = state_from_depot(depot)
        .map_or_else(|| "/dav".to_string(), |state| state.base_prefix().to_string());
    res.render(Redirect::permanent(target));
}

#[handler]
pub async fn caldav(_req: &mut Request, res: &mut Response, depot: &Depot) {
    redirect_to_prefix(depot, res);
}

#[handler]
pub async fn carddav(_req: &mut Request, res: &mut Response, depot: &Depot) {
    redirect_to_prefix(depot, res);
}
